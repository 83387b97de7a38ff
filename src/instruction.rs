//! The instruction set of the lamp virtual machine.
//!
//! The parser lowers scripts to a flat vector of these instructions; the
//! machine executes them with a program counter, a register file, and a
//! call stack. Control flow is relative `JUMP`s plus `JSR`/`END` for
//! routines. Each instruction carries its operands directly, so dispatch
//! is one exhaustive `match`.

use std::collections::HashMap;
use std::fmt;

use strum::Display;

use crate::time_pattern::TimePattern;
use crate::value::Value;

/// A named machine register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Register {
    Hue,
    Saturation,
    Brightness,
    Kelvin,
    Duration,
    Time,
    FirstZone,
    LastZone,
    Power,
    Name,
    Operand,
    Result,
    UnitMode,
}

impl Register {
    /// The register named by a script word, if any. Only a subset of the
    /// register file is addressable from scripts.
    pub fn script(name: &str) -> Option<Register> {
        match name {
            "hue" => Some(Register::Hue),
            "saturation" => Some(Register::Saturation),
            "brightness" => Some(Register::Brightness),
            "kelvin" => Some(Register::Kelvin),
            "duration" => Some(Register::Duration),
            "time" => Some(Register::Time),
            "power" => Some(Register::Power),
            _ => None,
        }
    }
}

/// Target selector for a color or power action, held by the `OPERAND`
/// register when `COLOR`, `POWER`, or `GET_COLOR` executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operand {
    All,
    Light,
    Group,
    Location,
    /// A single multi-zone light with the zone registers populated.
    MzLight,
}

/// How a `TIME_PATTERN` instruction combines its pattern with the `TIME`
/// register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SetOp {
    Init,
    Union,
}

/// Condition evaluated against the `RESULT` register by `JUMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum JumpCondition {
    Always,
    IfTrue,
    IfFalse,
}

/// Operators applied to the value stack by the `OP` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    UnaryMinus,
    Not,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::UnaryMinus => "u-",
            Operator::Not => "!",
        };
        write!(f, "{}", text)
    }
}

/// A register or variable read.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Reg(Register),
    Var(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Reg(r) => write!(f, "{}", r),
            Source::Var(name) => write!(f, "{}", name),
        }
    }
}

/// A register or variable write.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Reg(Register),
    Var(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Reg(r) => write!(f, "{}", r),
            Target::Var(name) => write!(f, "{}", name),
        }
    }
}

/// Argument source for `PARAM`, resolved at the call site before the new
/// frame is pushed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    Literal(Value),
    Reg(Register),
    Var(String),
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Literal(v) => write!(f, "{}", v),
            ParamSource::Reg(r) => write!(f, "{}", r),
            ParamSource::Var(name) => write!(f, "{}", name),
        }
    }
}

/// One machine instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    /// Apply the color registers to the lamps selected by `OPERAND`/`NAME`.
    Color,
    /// Apply the `POWER` register to the selected lamps.
    Power,
    /// Read a lamp's color back into the color registers.
    GetColor,
    /// Copy a register or variable into a register or variable.
    Move(Source, Target),
    /// Write an immediate into a register or variable.
    MoveQ(Value, Target),
    /// Push a register or variable onto the value stack.
    Push(Source),
    /// Push an immediate onto the value stack.
    PushQ(Value),
    /// Pop the value stack into a register or variable.
    Pop(Target),
    /// Apply an operator to the top of the value stack.
    Op(Operator),
    /// Relative jump, conditional on the `RESULT` register.
    Jump(JumpCondition, i64),
    /// Call the named routine.
    Jsr(String),
    /// Return from a routine.
    End,
    /// Open a loop scope on the current frame.
    Loop,
    /// Close the innermost loop scope.
    EndLoop,
    /// Bind a routine parameter in the frame being prepared for `JSR`.
    Param(String, ParamSource),
    /// Record a macro binding for runtime symbol lookup.
    Constant(String, Value),
    /// Initialize or extend the time pattern in the `TIME` register.
    TimePattern(SetOp, TimePattern),
    /// Sleep for the `TIME` register, or until a pattern in it matches.
    Wait,
    /// Prompt for a key press; `q` stops, `!` disables further pauses.
    Pause,
    Breakpoint,
    /// Marks a routine body; skipped during linear execution.
    Routine(String),
    /// Terminate the run.
    Stop,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::Color => write!(f, "color"),
            Instruction::Power => write!(f, "power"),
            Instruction::GetColor => write!(f, "get_color"),
            Instruction::Move(src, dest) => write!(f, "move {} {}", src, dest),
            Instruction::MoveQ(value, dest) => write!(f, "moveq {} {}", value, dest),
            Instruction::Push(src) => write!(f, "push {}", src),
            Instruction::PushQ(value) => write!(f, "pushq {}", value),
            Instruction::Pop(dest) => write!(f, "pop {}", dest),
            Instruction::Op(op) => write!(f, "op {}", op),
            Instruction::Jump(cond, offset) => write!(f, "jump {} {}", cond, offset),
            Instruction::Jsr(name) => write!(f, "jsr {}", name),
            Instruction::End => write!(f, "end"),
            Instruction::Loop => write!(f, "loop"),
            Instruction::EndLoop => write!(f, "end_loop"),
            Instruction::Param(name, src) => write!(f, "param {} {}", name, src),
            Instruction::Constant(name, value) => write!(f, "constant {} {}", name, value),
            Instruction::TimePattern(set_op, pattern) => {
                write!(f, "time_pattern {} {}", set_op, pattern)
            }
            Instruction::Wait => write!(f, "wait"),
            Instruction::Pause => write!(f, "pause"),
            Instruction::Breakpoint => write!(f, "breakpoint"),
            Instruction::Routine(name) => write!(f, "routine {}", name),
            Instruction::Stop => write!(f, "stop"),
        }
    }
}

/// A compiled script: the instruction vector plus the routine table.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub code: Vec<Instruction>,
    /// Routine name to the address of the first body instruction.
    pub routines: HashMap<String, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// True when every jump and routine address lands inside the program.
    /// A jump may also land one past the end, which terminates the run.
    pub fn targets_in_bounds(&self) -> bool {
        let len = self.code.len() as i64;
        for (i, inst) in self.code.iter().enumerate() {
            match inst {
                Instruction::Jump(_, offset) => {
                    let target = i as i64 + offset;
                    if target < 0 || target > len {
                        return false;
                    }
                }
                Instruction::Jsr(name) => {
                    if !self.routines.contains_key(name) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        self.routines.values().all(|&addr| (addr as i64) <= len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_script_names() {
        assert_eq!(Register::script("hue"), Some(Register::Hue));
        assert_eq!(Register::script("power"), Some(Register::Power));
        assert_eq!(Register::script("name"), None);
        assert_eq!(Register::script("operand"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Instruction::MoveQ(Value::Integer(32768), Target::Reg(Register::Hue)).to_string(),
            "moveq 32768 hue"
        );
        assert_eq!(
            Instruction::Jump(JumpCondition::IfFalse, 4).to_string(),
            "jump if_false 4"
        );
        assert_eq!(Register::FirstZone.to_string(), "first_zone");
    }

    #[test]
    fn test_targets_in_bounds() {
        let program = Program {
            code: vec![
                Instruction::Jump(JumpCondition::Always, 1),
                Instruction::Nop,
            ],
            routines: HashMap::new(),
        };
        assert!(program.targets_in_bounds());

        let bad = Program {
            code: vec![Instruction::Jump(JumpCondition::Always, 5)],
            routines: HashMap::new(),
        };
        assert!(!bad.targets_in_bounds());
    }
}
