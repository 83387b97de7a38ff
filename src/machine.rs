//! The virtual machine.
//!
//! Executes a compiled program against the register file, the call stack,
//! and the external collaborators in `Env`. Runtime failures (missing
//! lamps, unknown groups, bad zone requests, unknown variables) are
//! logged and the instruction becomes a no-op; only `STOP`, the halt
//! flag, or running off the end terminates a run.
//!
//! Unit handling: registers hold values in the current unit mode. The
//! `MOVEQ` immediates for the three color registers are canonically raw,
//! so a write re-interprets them when the mode is logical; actions force
//! color and duration to raw at dispatch time; a `UNIT_MODE` transition
//! rewrites exactly the three color registers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::call_stack::CallStack;
use crate::clock::Clock;
use crate::console::TermInput;
use crate::instruction::{
    Instruction, JumpCondition, Operand, ParamSource, Program, Register, SetOp, Source, Target,
};
use crate::light_set::{Color, Lamp, LightSet};
use crate::time_pattern::TimePattern;
use crate::units::{self, UnitMode};
use crate::value::Value;
use crate::vm_math;

/// External collaborators the machine acts through.
pub struct Env<'a> {
    pub lights: &'a dyn LightSet,
    pub clock: &'a mut dyn Clock,
    pub input: &'a mut dyn TermInput,
}

/// The machine register file.
#[derive(Debug, Clone)]
pub struct Registers {
    pub hue: Value,
    pub saturation: Value,
    pub brightness: Value,
    pub kelvin: Value,
    pub duration: Value,
    pub time: Value,
    pub first_zone: Value,
    pub last_zone: Value,
    pub power: Value,
    pub name: Value,
    pub operand: Value,
    pub result: Value,
    pub unit_mode: UnitMode,
}

impl Registers {
    fn new() -> Self {
        Registers {
            hue: Value::Integer(0),
            saturation: Value::Integer(0),
            brightness: Value::Integer(0),
            kelvin: Value::Integer(0),
            duration: Value::Integer(0),
            time: Value::Integer(0),
            first_zone: Value::None,
            last_zone: Value::None,
            power: Value::Bool(false),
            name: Value::None,
            operand: Value::None,
            result: Value::None,
            unit_mode: UnitMode::Logical,
        }
    }

    pub fn get(&self, reg: Register) -> Value {
        match reg {
            Register::Hue => self.hue.clone(),
            Register::Saturation => self.saturation.clone(),
            Register::Brightness => self.brightness.clone(),
            Register::Kelvin => self.kelvin.clone(),
            Register::Duration => self.duration.clone(),
            Register::Time => self.time.clone(),
            Register::FirstZone => self.first_zone.clone(),
            Register::LastZone => self.last_zone.clone(),
            Register::Power => self.power.clone(),
            Register::Name => self.name.clone(),
            Register::Operand => self.operand.clone(),
            Register::Result => self.result.clone(),
            Register::UnitMode => Value::Mode(self.unit_mode),
        }
    }

    pub fn set(&mut self, reg: Register, value: Value) {
        match reg {
            Register::Hue => self.hue = value,
            Register::Saturation => self.saturation = value,
            Register::Brightness => self.brightness = value,
            Register::Kelvin => self.kelvin = value,
            Register::Duration => self.duration = value,
            Register::Time => self.time = value,
            Register::FirstZone => self.first_zone = value,
            Register::LastZone => self.last_zone = value,
            Register::Power => self.power = value,
            Register::Name => self.name = value,
            Register::Operand => self.operand = value,
            Register::Result => self.result = value,
            Register::UnitMode => {
                if let Value::Mode(mode) = value {
                    self.unit_mode = mode;
                }
            }
        }
    }

    /// The device encoding of the `POWER` register.
    pub fn power_level(&self) -> u16 {
        if self.power.is_truthy() {
            65535
        } else {
            0
        }
    }
}

pub struct Machine {
    regs: Registers,
    call_stack: CallStack,
    pc: usize,
    keep_running: bool,
    enable_pause: bool,
    halt: Arc<AtomicBool>,
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            regs: Registers::new(),
            call_stack: CallStack::new(),
            pc: 0,
            keep_running: true,
            enable_pause: true,
            halt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag for external cancellation, polled at every fetch.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        self.halt.clone()
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn color_from_reg(&self) -> [Value; 4] {
        [
            self.regs.hue.clone(),
            self.regs.saturation.clone(),
            self.regs.brightness.clone(),
            self.regs.kelvin.clone(),
        ]
    }

    /// Restore the machine to its initial state between runs.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.call_stack.reset();
        self.pc = 0;
        self.keep_running = true;
        self.enable_pause = true;
        self.halt.store(false, Ordering::Relaxed);
    }

    pub fn stop(&mut self) {
        self.keep_running = false;
    }

    pub fn run(&mut self, program: &Program, env: &mut Env) {
        let skips = routine_skips(program);
        self.pc = 0;
        self.keep_running = true;
        env.clock.start();
        while self.keep_running
            && self.pc < program.code.len()
            && !self.halt.load(Ordering::Relaxed)
        {
            let inst = program.code[self.pc].clone();
            match inst {
                Instruction::Nop => self.pc += 1,
                Instruction::Color => {
                    self.color(env);
                    self.pc += 1;
                }
                Instruction::Power => {
                    self.power(env);
                    self.pc += 1;
                }
                Instruction::GetColor => {
                    self.get_color(env);
                    self.pc += 1;
                }
                Instruction::Move(src, dest) => {
                    self.do_move(&src, &dest);
                    self.pc += 1;
                }
                Instruction::MoveQ(value, dest) => {
                    self.moveq(value, &dest);
                    self.pc += 1;
                }
                Instruction::Push(src) => {
                    let value = self.read_source(&src);
                    self.call_stack.push_value(value);
                    self.pc += 1;
                }
                Instruction::PushQ(value) => {
                    self.call_stack.push_value(value);
                    self.pc += 1;
                }
                Instruction::Pop(dest) => {
                    let value = match self.call_stack.pop_value() {
                        Some(value) => value,
                        None => {
                            warn!("value stack underflow");
                            Value::None
                        }
                    };
                    self.put(&dest, value);
                    self.pc += 1;
                }
                Instruction::Op(op) => {
                    if let Err(e) = vm_math::apply(op, self.call_stack.values_mut()) {
                        warn!("{}", e);
                    }
                    self.pc += 1;
                }
                Instruction::Jump(cond, offset) => {
                    let taken = match cond {
                        JumpCondition::Always => true,
                        JumpCondition::IfTrue => self.regs.result.is_truthy(),
                        JumpCondition::IfFalse => !self.regs.result.is_truthy(),
                    };
                    if taken {
                        self.pc = (self.pc as i64 + offset).max(0) as usize;
                    } else {
                        self.pc += 1;
                    }
                }
                Instruction::Jsr(name) => self.jsr(&name, program),
                Instruction::End => self.end(),
                Instruction::Loop => {
                    self.call_stack.enter_loop();
                    self.pc += 1;
                }
                Instruction::EndLoop => {
                    self.call_stack.exit_loop();
                    self.pc += 1;
                }
                Instruction::Param(name, src) => {
                    let value = self.read_param(&src);
                    self.call_stack.put_param(&name, value);
                    self.pc += 1;
                }
                Instruction::Constant(name, value) => {
                    self.call_stack.put_constant(&name, value);
                    self.pc += 1;
                }
                Instruction::TimePattern(set_op, pattern) => {
                    self.time_pattern(set_op, pattern);
                    self.pc += 1;
                }
                Instruction::Wait => {
                    self.wait(env);
                    self.pc += 1;
                }
                Instruction::Pause => {
                    self.pause(env);
                    self.pc += 1;
                }
                Instruction::Breakpoint => {
                    debug!("breakpoint at address {}", self.pc);
                    self.pc += 1;
                }
                Instruction::Routine(_) => {
                    // Routine bodies only run via JSR.
                    self.pc = skips.get(&self.pc).copied().unwrap_or(self.pc + 1);
                }
                Instruction::Stop => break,
            }
        }
        env.clock.stop();
    }

    // ─── data movement ──────────────────────────────────────────────────

    fn read_source(&mut self, src: &Source) -> Value {
        match src {
            Source::Reg(reg) => self.regs.get(*reg),
            Source::Var(name) => match self.call_stack.get_variable(name) {
                Some(value) => value,
                None => {
                    warn!("Unknown: \"{}\"", name);
                    Value::None
                }
            },
        }
    }

    fn read_param(&mut self, src: &ParamSource) -> Value {
        match src {
            ParamSource::Literal(value) => value.clone(),
            ParamSource::Reg(reg) => self.regs.get(*reg),
            ParamSource::Var(name) => match self.call_stack.get_variable(name) {
                Some(value) => value,
                None => {
                    warn!("Unknown: \"{}\"", name);
                    Value::None
                }
            },
        }
    }

    fn put(&mut self, dest: &Target, value: Value) {
        match dest {
            Target::Reg(reg) => self.regs.set(*reg, value),
            Target::Var(name) => self.call_stack.put_variable(name, value),
        }
    }

    fn do_move(&mut self, src: &Source, dest: &Target) {
        if let Source::Var(name) = src {
            if self.call_stack.get_variable(name).is_none() {
                warn!("Unknown: \"{}\"", name);
                return;
            }
        }
        let value = self.read_source(src);
        self.put(dest, value);
    }

    /// `MOVEQ`: immediates for the color registers are raw in the
    /// instruction stream and re-interpreted into the current mode here.
    fn moveq(&mut self, value: Value, dest: &Target) {
        match dest {
            Target::Reg(Register::UnitMode) => match value {
                Value::Mode(mode) => self.set_unit_mode(mode),
                value => warn!("cannot load {} into unit_mode", value),
            },
            Target::Reg(
                reg @ (Register::Hue | Register::Saturation | Register::Brightness),
            ) => {
                let value = if self.regs.unit_mode == UnitMode::Logical && value.is_number() {
                    units::as_logical(*reg, &value)
                } else {
                    value
                };
                self.regs.set(*reg, value);
            }
            dest => self.put(dest, value),
        }
    }

    /// `UNIT_MODE` transitions rewrite exactly the three color registers;
    /// self-transitions are no-ops.
    fn set_unit_mode(&mut self, mode: UnitMode) {
        if self.regs.unit_mode == mode {
            return;
        }
        let convert = match mode {
            UnitMode::Logical => units::as_logical,
            UnitMode::Raw => units::as_raw,
        };
        for reg in [Register::Hue, Register::Saturation, Register::Brightness] {
            let value = self.regs.get(reg);
            self.regs.set(reg, convert(reg, &value));
        }
        self.regs.unit_mode = mode;
    }

    // ─── actions on the lamp set ────────────────────────────────────────

    fn color(&mut self, env: &mut Env) {
        let operand = match self.current_operand() {
            Some(operand) => operand,
            None => return,
        };
        let color = self.raw_color();
        let duration = self.raw_duration();
        match operand {
            Operand::All => env.lights.set_color(color, duration),
            Operand::Light => {
                if let Some(light) = self.named_light(env) {
                    light.set_color(color, duration);
                }
            }
            Operand::Group | Operand::Location => {
                if let Some(lights) = self.named_set(env, operand) {
                    for light in lights {
                        light.set_color(color, duration);
                    }
                }
            }
            Operand::MzLight => {
                if let Some(light) = self.named_light(env) {
                    if zone_check(light.as_ref()) {
                        let (start, end) = self.zone_range();
                        light.set_zone_color(start, end, color, duration);
                    }
                }
            }
        }
    }

    fn power(&mut self, env: &mut Env) {
        let operand = match self.current_operand() {
            Some(operand) => operand,
            None => return,
        };
        let level = self.regs.power_level();
        let duration = self.raw_duration();
        match operand {
            Operand::All => env.lights.set_power(level, duration),
            Operand::Light => {
                if let Some(light) = self.named_light(env) {
                    light.set_power(level, duration);
                }
            }
            Operand::Group | Operand::Location => {
                if let Some(lights) = self.named_set(env, operand) {
                    for light in lights {
                        light.set_power(level, duration);
                    }
                }
            }
            Operand::MzLight => {
                warn!("power does not support zones");
            }
        }
    }

    fn get_color(&mut self, env: &mut Env) {
        let operand = match self.current_operand() {
            Some(operand) => operand,
            None => return,
        };
        match operand {
            Operand::Light => {
                if let Some(light) = self.named_light(env) {
                    let color = light.get_color();
                    self.store_color(color);
                }
            }
            Operand::MzLight => {
                if let Some(light) = self.named_light(env) {
                    if zone_check(light.as_ref()) {
                        let (start, _) = self.zone_range();
                        if let Some(color) = light.get_color_zones(start, start + 1).first() {
                            self.store_color(*color);
                        }
                    }
                }
            }
            operand => warn!("get not supported for operand {}", operand),
        }
    }

    fn current_operand(&self) -> Option<Operand> {
        match &self.regs.operand {
            Value::Operand(operand) => Some(*operand),
            value => {
                warn!("no operand selected, have {}", value);
                None
            }
        }
    }

    fn named_light(&self, env: &Env) -> Option<Arc<dyn Lamp>> {
        let name = match &self.regs.name {
            Value::Str(name) => name.clone(),
            value => {
                warn!("no light name, have {}", value);
                return None;
            }
        };
        let light = env.lights.get_light(&name);
        if light.is_none() {
            warn!("Light \"{}\" not found.", name);
        }
        light
    }

    fn named_set(&self, env: &Env, operand: Operand) -> Option<Vec<Arc<dyn Lamp>>> {
        let name = match &self.regs.name {
            Value::Str(name) => name.clone(),
            value => {
                warn!("no {} name, have {}", operand, value);
                return None;
            }
        };
        let lights = match operand {
            Operand::Group => env.lights.get_group(&name),
            _ => env.lights.get_location(&name),
        };
        if lights.is_none() {
            warn!("Unknown {}: \"{}\"", operand, name);
        }
        lights
    }

    /// The color registers as raw device units, converting when the mode
    /// is logical. Hue wraps, the other components clamp.
    fn raw_color(&self) -> Color {
        let mode = self.regs.unit_mode;
        [
            raw_component(Register::Hue, &self.regs.hue, mode),
            raw_component(Register::Saturation, &self.regs.saturation, mode),
            raw_component(Register::Brightness, &self.regs.brightness, mode),
            raw_component(Register::Kelvin, &self.regs.kelvin, mode),
        ]
    }

    fn raw_duration(&self) -> u32 {
        let ms = match self.regs.unit_mode {
            UnitMode::Raw => self.regs.duration.as_int().unwrap_or(0),
            UnitMode::Logical => units::as_raw(Register::Duration, &self.regs.duration)
                .as_int()
                .unwrap_or(0),
        };
        ms.clamp(0, u32::MAX as i64) as u32
    }

    /// Inclusive zone registers to an end-exclusive range. A missing
    /// `LAST_ZONE` means the single zone at `FIRST_ZONE`.
    fn zone_range(&self) -> (usize, usize) {
        let first = self.regs.first_zone.as_int().unwrap_or(0).max(0);
        let last = self.regs.last_zone.as_int().unwrap_or(first).max(first);
        (first as usize, (last + 1) as usize)
    }

    /// Write a device color into the registers, in the current mode's
    /// units.
    fn store_color(&mut self, color: Color) {
        match self.regs.unit_mode {
            UnitMode::Raw => {
                self.regs.hue = Value::Integer(color[0] as i64);
                self.regs.saturation = Value::Integer(color[1] as i64);
                self.regs.brightness = Value::Integer(color[2] as i64);
            }
            UnitMode::Logical => {
                self.regs.hue = units::as_logical(Register::Hue, &Value::Integer(color[0] as i64));
                self.regs.saturation =
                    units::as_logical(Register::Saturation, &Value::Integer(color[1] as i64));
                self.regs.brightness =
                    units::as_logical(Register::Brightness, &Value::Integer(color[2] as i64));
            }
        }
        self.regs.kelvin = Value::Integer(color[3] as i64);
    }

    // ─── timing and control ─────────────────────────────────────────────

    /// Sleep on the `TIME` register: a pattern waits for a wall-clock
    /// match; a number is milliseconds in raw mode, seconds in logical.
    fn wait(&mut self, env: &mut Env) {
        match self.regs.time.clone() {
            Value::Pattern(pattern) => env.clock.wait_until(&pattern),
            value => {
                if let Some(time) = value.as_f64() {
                    if time > 0.0 {
                        let seconds = match self.regs.unit_mode {
                            UnitMode::Raw => time / 1000.0,
                            UnitMode::Logical => time,
                        };
                        env.clock.pause_for(seconds);
                    }
                }
            }
        }
    }

    fn time_pattern(&mut self, set_op: SetOp, pattern: TimePattern) {
        match set_op {
            SetOp::Init => self.regs.time = Value::Pattern(pattern),
            SetOp::Union => match &mut self.regs.time {
                Value::Pattern(existing) => existing.union(&pattern),
                _ => self.regs.time = Value::Pattern(pattern),
            },
        }
    }

    fn jsr(&mut self, name: &str, program: &Program) {
        match program.routines.get(name) {
            Some(&addr) => {
                self.call_stack.set_return(self.pc + 1);
                self.call_stack.push_current();
                self.pc = addr;
            }
            None => {
                warn!("Unknown routine: \"{}\"", name);
                self.pc += 1;
            }
        }
    }

    fn end(&mut self) {
        let return_addr = self.call_stack.get_return();
        if self.call_stack.pop_current() {
            self.pc = return_addr;
        } else {
            warn!("return outside of a routine");
            self.pc += 1;
        }
    }

    fn pause(&mut self, env: &mut Env) {
        if !self.enable_pause {
            return;
        }
        println!("Press any to continue, q to quit, ! to run.");
        match env.input.read_char() {
            Some('q') => self.stop(),
            Some('!') => {
                println!("Running...");
                self.enable_pause = false;
            }
            _ => println!("Running..."),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_component(reg: Register, value: &Value, mode: UnitMode) -> u16 {
    let raw = match mode {
        UnitMode::Raw => value.as_int().unwrap_or(0),
        UnitMode::Logical => units::as_raw(reg, value).as_int().unwrap_or(0),
    };
    if reg == Register::Hue {
        raw.rem_euclid(65536) as u16
    } else {
        raw.clamp(0, 65535) as u16
    }
}

fn zone_check(light: &dyn Lamp) -> bool {
    if !light.multizone() {
        warn!("Light \"{}\" is not multi-zone.", light.name());
        return false;
    }
    true
}

/// Scan for routine markers: linear execution resumes after the matching
/// `END`.
fn routine_skips(program: &Program) -> HashMap<usize, usize> {
    let mut skips = HashMap::new();
    for (i, inst) in program.code.iter().enumerate() {
        if matches!(inst, Instruction::Routine(_)) {
            let mut j = i + 1;
            while j < program.code.len() && !matches!(program.code[j], Instruction::End) {
                j += 1;
            }
            skips.insert(i, j + 1);
        }
    }
    skips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeClock, FakeLightSet, FakeTermInput, LampCall};

    fn run(program: Program, lights: &FakeLightSet) -> (Machine, FakeClock) {
        run_with_input(program, lights, "")
    }

    fn run_with_input(
        program: Program,
        lights: &FakeLightSet,
        input: &str,
    ) -> (Machine, FakeClock) {
        let mut clock = FakeClock::default();
        let mut input = FakeTermInput::new(input);
        let mut machine = Machine::new();
        machine.run(
            &program,
            &mut Env {
                lights,
                clock: &mut clock,
                input: &mut input,
            },
        );
        (machine, clock)
    }

    fn code_for_set(name: &str, operand: Operand, color: [i64; 4]) -> Vec<Instruction> {
        vec![
            Instruction::MoveQ(Value::Mode(UnitMode::Raw), Target::Reg(Register::UnitMode)),
            Instruction::MoveQ(Value::Integer(color[0]), Target::Reg(Register::Hue)),
            Instruction::MoveQ(Value::Integer(color[1]), Target::Reg(Register::Saturation)),
            Instruction::MoveQ(Value::Integer(color[2]), Target::Reg(Register::Brightness)),
            Instruction::MoveQ(Value::Integer(color[3]), Target::Reg(Register::Kelvin)),
            Instruction::MoveQ(Value::Str(name.to_string()), Target::Reg(Register::Name)),
            Instruction::MoveQ(Value::Operand(operand), Target::Reg(Register::Operand)),
            Instruction::Color,
        ]
    }

    fn program(code: Vec<Instruction>) -> Program {
        Program {
            code,
            routines: HashMap::new(),
        }
    }

    #[test]
    fn test_set_single_color() {
        let lights = FakeLightSet::test_inventory();
        let (machine, clock) = run(
            program(code_for_set("Top", Operand::Light, [1, 2, 3, 4])),
            &lights,
        );
        assert_eq!(
            lights.calls_for("Top"),
            vec![LampCall::SetColor([1, 2, 3, 4], 0)]
        );
        assert_eq!(lights.calls_for("Bottom"), vec![]);
        assert_eq!(
            machine.color_from_reg(),
            [
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
            ]
        );
        assert!(clock.started && clock.stopped);
    }

    #[test]
    fn test_get_color_round_trip() {
        let lights = FakeLightSet::test_inventory();
        lights.lamp("Top").unwrap().set_current_color([32768, 13107, 26214, 2500]);
        let code = vec![
            Instruction::MoveQ(Value::Str("Top".into()), Target::Reg(Register::Name)),
            Instruction::MoveQ(Value::Operand(Operand::Light), Target::Reg(Register::Operand)),
            Instruction::GetColor,
        ];
        let (machine, _) = run(program(code), &lights);
        // Logical mode: the device color comes back in logical units.
        assert_eq!(
            machine.color_from_reg(),
            [
                Value::Float(180.0),
                Value::Float(20.0),
                Value::Float(40.0),
                Value::Integer(2500),
            ]
        );
    }

    #[test]
    fn test_unit_mode_transition_rewrites_colors() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Integer(32768), Target::Reg(Register::Hue)),
            Instruction::MoveQ(Value::Mode(UnitMode::Raw), Target::Reg(Register::UnitMode)),
        ];
        let (machine, _) = run(program(code), &lights);
        // The raw immediate reads back as 180 degrees in logical mode,
        // then returns to raw on the transition.
        assert_eq!(machine.registers().hue, Value::Integer(32768));
        assert_eq!(machine.registers().unit_mode, UnitMode::Raw);
    }

    #[test]
    fn test_logical_action_converts_at_dispatch() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Integer(32768), Target::Reg(Register::Hue)),
            Instruction::MoveQ(Value::Integer(13107), Target::Reg(Register::Saturation)),
            Instruction::MoveQ(Value::Integer(26214), Target::Reg(Register::Brightness)),
            Instruction::MoveQ(Value::Integer(3000), Target::Reg(Register::Kelvin)),
            Instruction::MoveQ(Value::Float(2.0), Target::Reg(Register::Duration)),
            Instruction::MoveQ(Value::Str("Top".into()), Target::Reg(Register::Name)),
            Instruction::MoveQ(Value::Operand(Operand::Light), Target::Reg(Register::Operand)),
            Instruction::Color,
        ];
        let (_, _) = run(program(code), &lights);
        assert_eq!(
            lights.calls_for("Top"),
            vec![LampCall::SetColor([32768, 13107, 26214, 3000], 2000)]
        );
    }

    #[test]
    fn test_jump_conditions() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Bool(true), Target::Reg(Register::Result)),
            Instruction::Jump(JumpCondition::IfFalse, 2),
            Instruction::MoveQ(Value::Integer(1), Target::Reg(Register::Kelvin)),
            Instruction::Jump(JumpCondition::IfTrue, 2),
            Instruction::MoveQ(Value::Integer(99), Target::Reg(Register::Kelvin)),
        ];
        let (machine, _) = run(program(code), &lights);
        assert_eq!(machine.registers().kelvin, Value::Integer(1));
    }

    #[test]
    fn test_routine_call_and_return() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::Routine("r".to_string()),
            Instruction::Move(Source::Var("p".to_string()), Target::Reg(Register::Kelvin)),
            Instruction::End,
            Instruction::Param("p".to_string(), ParamSource::Literal(Value::Integer(42))),
            Instruction::Jsr("r".to_string()),
            Instruction::MoveQ(Value::Integer(7), Target::Reg(Register::Duration)),
        ];
        let mut routines = HashMap::new();
        routines.insert("r".to_string(), 1);
        let (machine, _) = run(Program { code, routines }, &lights);
        assert_eq!(machine.registers().kelvin, Value::Integer(42));
        assert_eq!(machine.registers().duration, Value::Integer(7));
    }

    #[test]
    fn test_wait_raw_is_milliseconds() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Mode(UnitMode::Raw), Target::Reg(Register::UnitMode)),
            Instruction::MoveQ(Value::Integer(500), Target::Reg(Register::Time)),
            Instruction::Wait,
        ];
        let (_, clock) = run(program(code), &lights);
        assert_eq!(clock.pauses, vec![0.5]);
    }

    #[test]
    fn test_wait_logical_is_seconds() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Integer(5), Target::Reg(Register::Time)),
            Instruction::Wait,
        ];
        let (_, clock) = run(program(code), &lights);
        assert_eq!(clock.pauses, vec![5.0]);
    }

    #[test]
    fn test_wait_on_time_pattern() {
        let lights = FakeLightSet::test_inventory();
        let pattern = TimePattern::parse("7:30").unwrap();
        let code = vec![
            Instruction::TimePattern(SetOp::Init, pattern.clone()),
            Instruction::TimePattern(SetOp::Union, TimePattern::parse("19:30").unwrap()),
            Instruction::Wait,
        ];
        let (_, clock) = run(program(code), &lights);
        assert_eq!(clock.waits.len(), 1);
        assert!(clock.waits[0].matches(7, 30));
        assert!(clock.waits[0].matches(19, 30));
    }

    #[test]
    fn test_stop_terminates() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Integer(1), Target::Reg(Register::Kelvin)),
            Instruction::Stop,
            Instruction::MoveQ(Value::Integer(2), Target::Reg(Register::Kelvin)),
        ];
        let (machine, _) = run(program(code), &lights);
        assert_eq!(machine.registers().kelvin, Value::Integer(1));
    }

    #[test]
    fn test_halt_flag_stops_at_fetch() {
        let lights = FakeLightSet::test_inventory();
        let mut machine = Machine::new();
        machine.halt_handle().store(true, Ordering::Relaxed);
        let mut clock = FakeClock::default();
        let mut input = FakeTermInput::new("");
        machine.run(
            &program(vec![Instruction::MoveQ(
                Value::Integer(1),
                Target::Reg(Register::Kelvin),
            )]),
            &mut Env {
                lights: &lights,
                clock: &mut clock,
                input: &mut input,
            },
        );
        assert_eq!(machine.registers().kelvin, Value::Integer(0));
    }

    #[test]
    fn test_pause_quits_on_q() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::Pause,
            Instruction::MoveQ(Value::Integer(1), Target::Reg(Register::Kelvin)),
        ];
        let (machine, _) = run_with_input(program(code), &lights, "q");
        assert_eq!(machine.registers().kelvin, Value::Integer(0));
    }

    #[test]
    fn test_pause_bang_disables_pausing() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::Pause,
            Instruction::Pause,
            Instruction::MoveQ(Value::Integer(1), Target::Reg(Register::Kelvin)),
        ];
        // Only one character available; the second pause must not read.
        let (machine, _) = run_with_input(program(code), &lights, "!");
        assert_eq!(machine.registers().kelvin, Value::Integer(1));
    }

    #[test]
    fn test_missing_lamp_is_not_fatal() {
        let lights = FakeLightSet::test_inventory();
        let mut code = code_for_set("Nowhere", Operand::Light, [1, 2, 3, 4]);
        code.push(Instruction::MoveQ(
            Value::Integer(9),
            Target::Reg(Register::Kelvin),
        ));
        let (machine, _) = run(program(code), &lights);
        for name in lights.light_names() {
            assert_eq!(lights.calls_for(&name), vec![]);
        }
        assert_eq!(machine.registers().kelvin, Value::Integer(9));
    }

    #[test]
    fn test_zone_on_non_multizone_skipped() {
        let lights = FakeLightSet::test_inventory();
        let code = vec![
            Instruction::MoveQ(Value::Mode(UnitMode::Raw), Target::Reg(Register::UnitMode)),
            Instruction::MoveQ(Value::Str("Top".into()), Target::Reg(Register::Name)),
            Instruction::MoveQ(Value::Integer(0), Target::Reg(Register::FirstZone)),
            Instruction::MoveQ(Value::None, Target::Reg(Register::LastZone)),
            Instruction::MoveQ(
                Value::Operand(Operand::MzLight),
                Target::Reg(Register::Operand),
            ),
            Instruction::Color,
        ];
        let (_, _) = run(program(code), &lights);
        assert_eq!(lights.calls_for("Top"), vec![]);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let lights = FakeLightSet::test_inventory();
        let (mut machine, _) = run(
            program(code_for_set("Top", Operand::Light, [1, 2, 3, 4])),
            &lights,
        );
        machine.reset();
        assert_eq!(machine.registers().hue, Value::Integer(0));
        assert_eq!(machine.registers().unit_mode, UnitMode::Logical);
        assert_eq!(machine.registers().name, Value::None);
    }
}
