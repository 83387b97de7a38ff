//! Recursive-descent parser: lowers lamp scripts to machine instructions.
//!
//! One method per production, driving the lexer token by token and
//! emitting through the code generator. Unit conversion of numeric
//! literals destined for the color registers happens here, at compile
//! time, tracked by the `units` command; everything else converts in the
//! machine at run time.

use std::fs;
use std::path::Path;

use log::error;
use thiserror::Error;

use crate::code_gen::CodeGen;
use crate::expr::ExprParser;
use crate::instruction::{
    Instruction, JumpCondition, Operand, ParamSource, Program, Register, SetOp, Source, Target,
};
use crate::lexer::{Lex, Token, TokenKind};
use crate::symbol_table::{CallContext, Routine};
use crate::time_pattern::TimePattern;
use crate::units::{self, UnitMode};
use crate::value::Value;

/// A single compile error with its source line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

/// All errors accumulated by a failed compile, newline-separated when
/// displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParseError>);

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error accessing script file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseErrors),
}

type ParseResult<T = ()> = Result<T, ParseError>;

/// Which action instruction an operand list feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Color,
    Power,
}

pub struct Parser {
    lexer: Lex,
    current: Token,
    context: CallContext,
    code: CodeGen,
    unit_mode: UnitMode,
    loop_serial: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        let mut lexer = Lex::new(source);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            context: CallContext::new(),
            code: CodeGen::new(),
            unit_mode: UnitMode::Logical,
            loop_serial: 0,
        }
    }

    /// Compile with the peephole pass.
    pub fn parse(self) -> Result<Program, ParseErrors> {
        self.parse_with(true)
    }

    /// Compile without the peephole pass.
    pub fn parse_unoptimized(self) -> Result<Program, ParseErrors> {
        self.parse_with(false)
    }

    fn parse_with(mut self, optimize: bool) -> Result<Program, ParseErrors> {
        match self.script() {
            Ok(()) => {
                if optimize {
                    self.code.optimize();
                }
                Ok(self.code.program())
            }
            Err(e) => Err(ParseErrors(vec![e])),
        }
    }

    fn script(&mut self) -> ParseResult {
        self.body()?;
        if self.current.kind != TokenKind::Eof {
            return self.fail("Didn't get to end of file.".to_string());
        }
        Ok(())
    }

    fn body(&mut self) -> ParseResult {
        while self.current.kind != TokenKind::Eof {
            self.command()?;
        }
        Ok(())
    }

    fn command(&mut self) -> ParseResult {
        match self.current.kind {
            TokenKind::Assign => self.assignment(),
            TokenKind::Breakpoint => self.breakpoint(),
            TokenKind::Define => self.definition(),
            TokenKind::Get => self.get(),
            TokenKind::If => self.if_command(),
            TokenKind::Name => self.call_routine(),
            TokenKind::Off => self.power_off(),
            TokenKind::On => self.power_on(),
            TokenKind::Pause => self.pause(),
            TokenKind::Register => self.set_reg(),
            TokenKind::Repeat => self.repeat(),
            TokenKind::Set => self.set(),
            TokenKind::Units => self.set_units(),
            TokenKind::Wait => self.wait(),
            _ => self.fail(format!("Unexpected input \"{}\"", self.current.text)),
        }
    }

    // ─── register assignment ────────────────────────────────────────────

    fn set_reg(&mut self) -> ParseResult {
        let reg = match Register::script(&self.current.text) {
            Some(reg) => reg,
            None => return self.fail(format!("Expected register, got \"{}\"", self.current.text)),
        };
        if reg == Register::Time {
            return self.time_spec();
        }
        self.advance();
        if self.current.kind == TokenKind::LiteralString {
            return self.fail("Quoted value not allowed here.".to_string());
        }
        self.rvalue(Target::Reg(reg))
    }

    fn time_spec(&mut self) -> ParseResult {
        self.advance();
        if self.current.kind == TokenKind::At {
            self.advance();
            return self.time_patterns();
        }
        self.rvalue(Target::Reg(Register::Time))
    }

    fn time_patterns(&mut self) -> ParseResult {
        let pattern = self.current_time_pattern()?;
        self.code.add(Instruction::TimePattern(SetOp::Init, pattern));
        self.advance();
        while self.current.kind == TokenKind::Or {
            self.advance();
            let pattern = self.current_time_pattern()?;
            self.code.add(Instruction::TimePattern(SetOp::Union, pattern));
            self.advance();
        }
        Ok(())
    }

    fn current_time_pattern(&self) -> ParseResult<TimePattern> {
        let invalid = format!("Invalid time specification: \"{}\"", self.current.text);
        match self.current.kind {
            TokenKind::TimePattern => {
                TimePattern::parse(&self.current.text).map_err(|_| ParseError {
                    line: self.current.line,
                    message: invalid,
                })
            }
            TokenKind::Name => match self.context.get_macro(&self.current.text) {
                Some(Value::Pattern(pattern)) => Ok(pattern.clone()),
                _ => self.fail(invalid),
            },
            _ => self.fail(invalid),
        }
    }

    fn set_units(&mut self) -> ParseResult {
        self.advance();
        let mode = match self.current.kind {
            TokenKind::Raw => UnitMode::Raw,
            TokenKind::Logical => UnitMode::Logical,
            _ => {
                return self
                    .fail(format!("Invalid parameter \"{}\" for units.", self.current.text))
            }
        };
        self.unit_mode = mode;
        self.code
            .add(Instruction::MoveQ(Value::Mode(mode), Target::Reg(Register::UnitMode)));
        self.advance();
        Ok(())
    }

    // ─── actions ────────────────────────────────────────────────────────

    fn set(&mut self) -> ParseResult {
        self.action(Action::Color)
    }

    fn power_on(&mut self) -> ParseResult {
        self.code
            .add(Instruction::MoveQ(Value::Bool(true), Target::Reg(Register::Power)));
        self.action(Action::Power)
    }

    fn power_off(&mut self) -> ParseResult {
        self.code
            .add(Instruction::MoveQ(Value::Bool(false), Target::Reg(Register::Power)));
        self.action(Action::Power)
    }

    fn action_instruction(&mut self, action: Action) {
        self.code.add(match action {
            Action::Color => Instruction::Color,
            Action::Power => Instruction::Power,
        });
    }

    /// `set`/`on`/`off` bodies: a `WAIT` so the timing registers take
    /// effect, then one action per operand.
    fn action(&mut self, action: Action) -> ParseResult {
        self.code.add(Instruction::Wait);
        self.advance();
        if self.current.kind == TokenKind::All {
            self.code
                .add(Instruction::MoveQ(Value::None, Target::Reg(Register::Name)));
            self.code.add(Instruction::MoveQ(
                Value::Operand(Operand::All),
                Target::Reg(Register::Operand),
            ));
            self.action_instruction(action);
            self.advance();
            return Ok(());
        }
        self.operand_list(action)
    }

    fn operand_list(&mut self, action: Action) -> ParseResult {
        self.operand(action)?;
        self.action_instruction(action);
        while self.current.kind == TokenKind::And {
            self.advance();
            self.operand(action)?;
            self.action_instruction(action);
        }
        Ok(())
    }

    /// One group, location, or light, with an optional zone range.
    /// Populates the `NAME` and `OPERAND` registers.
    fn operand(&mut self, action: Action) -> ParseResult {
        let mut operand = match self.current.kind {
            TokenKind::Group => {
                self.advance();
                Operand::Group
            }
            TokenKind::Location => {
                self.advance();
                Operand::Location
            }
            _ => Operand::Light,
        };

        if let Some(name) = self.current_str() {
            self.code
                .add(Instruction::MoveQ(Value::Str(name), Target::Reg(Register::Name)));
            self.advance();
        } else if self.current.kind == TokenKind::Name {
            if !self.context.is_variable(&self.current.text) {
                return self.fail(format!("Not a variable: \"{}\"", self.current.text));
            }
            self.code.add(Instruction::Move(
                Source::Var(self.current.text.clone()),
                Target::Reg(Register::Name),
            ));
            self.advance();
        } else {
            return self.fail(format!("Needed a light, got \"{}\".", self.current.text));
        }

        if self.current.kind == TokenKind::Zone {
            if action != Action::Color {
                return self.fail("Zones not supported for power".to_string());
            }
            self.advance();
            self.set_zones(false)?;
            operand = Operand::MzLight;
        }

        self.code.add(Instruction::MoveQ(
            Value::Operand(operand),
            Target::Reg(Register::Operand),
        ));
        Ok(())
    }

    /// One or two zone numbers into `FIRST_ZONE`/`LAST_ZONE`; a single
    /// number leaves `LAST_ZONE` as none.
    fn set_zones(&mut self, only_one: bool) -> ParseResult {
        if !self.at_rvalue() {
            return self.fail(format!("Expected zone, got \"{}\"", self.current.text));
        }
        self.rvalue(Target::Reg(Register::FirstZone))?;
        if !only_one && self.at_rvalue() {
            return self.rvalue(Target::Reg(Register::LastZone));
        }
        self.code
            .add(Instruction::MoveQ(Value::None, Target::Reg(Register::LastZone)));
        Ok(())
    }

    fn get(&mut self) -> ParseResult {
        self.advance();
        if self.current.kind == TokenKind::All {
            self.code
                .add(Instruction::MoveQ(Value::None, Target::Reg(Register::Name)));
            self.code.add(Instruction::MoveQ(
                Value::Operand(Operand::All),
                Target::Reg(Register::Operand),
            ));
            self.code.add(Instruction::GetColor);
            self.advance();
            return Ok(());
        }
        if !self.at_rvalue() {
            return self.fail(format!("Needed light for get, got \"{}\".", self.current.text));
        }
        self.rvalue(Target::Reg(Register::Name))?;
        let mut operand = Operand::Light;
        if self.current.kind == TokenKind::Zone {
            operand = Operand::MzLight;
            self.advance();
            self.set_zones(true)?;
        }
        self.code.add(Instruction::MoveQ(
            Value::Operand(operand),
            Target::Reg(Register::Operand),
        ));
        self.code.add(Instruction::GetColor);
        Ok(())
    }

    fn wait(&mut self) -> ParseResult {
        self.code.add(Instruction::Wait);
        self.advance();
        Ok(())
    }

    fn pause(&mut self) -> ParseResult {
        self.code.add(Instruction::Pause);
        self.advance();
        Ok(())
    }

    fn breakpoint(&mut self) -> ParseResult {
        self.code.add(Instruction::Breakpoint);
        self.advance();
        Ok(())
    }

    // ─── assignment and rvalues ─────────────────────────────────────────

    fn assignment(&mut self) -> ParseResult {
        self.advance();
        if self.current.kind != TokenKind::Name {
            return self.fail(format!(
                "Expected name for assignment, got \"{}\"",
                self.current.text
            ));
        }
        let dest = self.current.text.clone();
        self.advance();
        self.rvalue(Target::Var(dest.clone()))?;
        self.context.add_variable(&dest);
        Ok(())
    }

    /// Consume an rvalue and emit code that leaves it in `dest`.
    fn rvalue(&mut self, dest: Target) -> ParseResult {
        if let Some(value) = self.current_constant() {
            let value = self.convert_literal(&dest, value);
            self.code.add(Instruction::MoveQ(value, dest));
            self.advance();
            return Ok(());
        }
        if self.current.kind == TokenKind::TimePattern {
            // The token had pattern shape but did not parse as one.
            return self.fail(format!(
                "Invalid time specification: \"{}\"",
                self.current.text
            ));
        }
        if self.current.kind == TokenKind::Name && self.context.is_variable(&self.current.text) {
            self.code.add(Instruction::Move(
                Source::Var(self.current.text.clone()),
                dest,
            ));
            self.advance();
            return Ok(());
        }
        if self.current.kind == TokenKind::Expression {
            self.compile_expression()?;
            self.code.add(Instruction::Pop(dest));
            self.advance();
            return Ok(());
        }
        if self.current.kind == TokenKind::Register {
            if let Some(reg) = Register::script(&self.current.text) {
                self.code.add(Instruction::Move(Source::Reg(reg), dest));
                self.advance();
                return Ok(());
            }
        }
        self.fail(format!("Cannot use \"{}\" as a value.", self.current.text))
    }

    fn compile_expression(&mut self) -> ParseResult {
        let mut parser = ExprParser::new(&self.current.text, &self.context);
        parser.generate_code(&mut self.code).map_err(|_| ParseError {
            line: self.current.line,
            message: format!("Error parsing expression \"{}\"", self.current.text),
        })
    }

    /// Numeric literals headed for a color register are converted to raw
    /// device units while the script is in logical mode, so the emitted
    /// immediates are canonically raw.
    fn convert_literal(&self, dest: &Target, value: Value) -> Value {
        if let Target::Reg(
            reg @ (Register::Hue | Register::Saturation | Register::Brightness),
        ) = dest
        {
            if self.unit_mode == UnitMode::Logical && value.is_number() {
                return units::as_raw(*reg, &value);
            }
        }
        value
    }

    fn at_rvalue(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Expression
                | TokenKind::LiteralString
                | TokenKind::Name
                | TokenKind::Number
        )
    }

    /// The current token as a compile-time literal, if it is one.
    fn current_literal(&self) -> Option<Value> {
        match self.current.kind {
            TokenKind::Number => {
                let text = &self.current.text;
                if text.contains('.') {
                    text.parse::<f64>().ok().map(Value::Float)
                } else {
                    text.parse::<i64>().ok().map(Value::Integer)
                }
            }
            TokenKind::LiteralString => Some(Value::Str(self.current.text.clone())),
            TokenKind::TimePattern => {
                TimePattern::parse(&self.current.text).ok().map(Value::Pattern)
            }
            _ => None,
        }
    }

    /// The current token as a compile-time constant: a literal, or the
    /// value of a macro.
    fn current_constant(&self) -> Option<Value> {
        if let Some(value) = self.current_literal() {
            return Some(value);
        }
        if self.current.kind == TokenKind::Name {
            return self.context.get_macro(&self.current.text).cloned();
        }
        None
    }

    fn current_str(&self) -> Option<String> {
        match self.current_constant() {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    // ─── definitions and calls ──────────────────────────────────────────

    fn definition(&mut self) -> ParseResult {
        self.advance();
        if self.current.kind != TokenKind::Name {
            return self.fail(format!(
                "Expected name for definition, got \"{}\"",
                self.current.text
            ));
        }
        let name = self.current.text.clone();
        self.advance();
        if self.detect_routine_start() {
            if self.context.get_routine(&name).is_some() {
                return self.fail(format!("Already defined: \"{}\"", name));
            }
            return self.routine_definition(name);
        }
        self.macro_definition(name)
    }

    /// A definition followed by `with`, `begin`, a command keyword, or the
    /// name of an existing routine is a routine; anything else is a macro.
    fn detect_routine_start(&self) -> bool {
        if self.current.kind == TokenKind::Name
            && self.context.get_routine(&self.current.text).is_some()
        {
            return true;
        }
        matches!(
            self.current.kind,
            TokenKind::Begin
                | TokenKind::With
                | TokenKind::Register
                | TokenKind::Set
                | TokenKind::On
                | TokenKind::Off
                | TokenKind::Get
                | TokenKind::Assign
                | TokenKind::Repeat
                | TokenKind::If
                | TokenKind::Pause
                | TokenKind::Wait
                | TokenKind::Units
                | TokenKind::Breakpoint
        )
    }

    /// A macro: a global compile-time alias for a constant.
    fn macro_definition(&mut self, name: String) -> ParseResult {
        let value = match self.current_constant() {
            Some(value) => value,
            None => {
                return self.fail(format!("Macro needs constant, got \"{}\"", self.current.text))
            }
        };
        self.context.add_macro(&name, value.clone());
        self.code.add(Instruction::Constant(name, value));
        self.advance();
        Ok(())
    }

    fn routine_definition(&mut self, name: String) -> ParseResult {
        if self.context.in_routine() {
            return self.fail("Nested definition not allowed.".to_string());
        }
        self.context.enter_routine();
        self.context.push();
        self.code.begin_routine(&name);

        let mut routine = Routine::new(&name);
        if self.current.kind == TokenKind::With {
            self.advance();
            self.param_decl(&mut routine)?;
        }
        // Registered before the body so the routine can call itself.
        self.context.add_routine(routine);

        if self.current.kind == TokenKind::Begin {
            self.advance();
            self.compound()?;
        } else {
            self.command()?;
        }

        self.context.pop();
        self.code.add(Instruction::End);
        self.context.exit_routine();
        Ok(())
    }

    /// `with p1 and p2 and …`. Declarations are compile-time only.
    fn param_decl(&mut self, routine: &mut Routine) -> ParseResult {
        loop {
            if self.current.kind != TokenKind::Name {
                return self.fail(format!(
                    "Expected parameter name, got \"{}\"",
                    self.current.text
                ));
            }
            if routine.has_param(&self.current.text) {
                return self.fail(format!(
                    "Duplicate parameter name: \"{}\"",
                    self.current.text
                ));
            }
            routine.add_param(&self.current.text);
            self.context.add_param(&self.current.text);
            self.advance();
            if self.current.kind != TokenKind::And {
                return Ok(());
            }
            self.advance();
        }
    }

    fn compound(&mut self) -> ParseResult {
        while self.current.kind != TokenKind::End {
            if self.current.kind == TokenKind::Eof {
                return self.fail("End of file before \"end\".".to_string());
            }
            self.command()?;
        }
        self.advance();
        Ok(())
    }

    fn call_routine(&mut self) -> ParseResult {
        let routine = match self.context.get_routine(&self.current.text) {
            Some(routine) => routine.clone(),
            None => return self.fail(format!("Unknown name: \"{}\"", self.current.text)),
        };
        self.advance();
        for param in routine.params() {
            self.call_arg(param)?;
        }
        self.code.add(Instruction::Jsr(routine.name().to_string()));
        Ok(())
    }

    /// One call-site argument, resolved when `PARAM` executes.
    fn call_arg(&mut self, param: &str) -> ParseResult {
        if let Some(value) = self.current_constant() {
            self.code.add(Instruction::Param(
                param.to_string(),
                ParamSource::Literal(value),
            ));
            self.advance();
            return Ok(());
        }
        if self.current.kind == TokenKind::Name && self.context.is_variable(&self.current.text) {
            self.code.add(Instruction::Param(
                param.to_string(),
                ParamSource::Var(self.current.text.clone()),
            ));
            self.advance();
            return Ok(());
        }
        if self.current.kind == TokenKind::Register {
            if let Some(reg) = Register::script(&self.current.text) {
                self.code
                    .add(Instruction::Param(param.to_string(), ParamSource::Reg(reg)));
                self.advance();
                return Ok(());
            }
        }
        if self.current.kind == TokenKind::Expression {
            self.compile_expression()?;
            self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
            self.code.add(Instruction::Param(
                param.to_string(),
                ParamSource::Reg(Register::Result),
            ));
            self.advance();
            return Ok(());
        }
        self.fail(format!("Cannot use \"{}\" as a value.", self.current.text))
    }

    // ─── control flow ───────────────────────────────────────────────────

    fn if_command(&mut self) -> ParseResult {
        self.advance();
        if self.current.kind != TokenKind::Expression {
            return self.fail(format!(
                "Expected expression for if, got \"{}\"",
                self.current.text
            ));
        }
        self.compile_expression()?;
        self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
        self.advance();

        let marker = self.code.if_start();
        self.command_seq()?;
        if self.current.kind == TokenKind::Else {
            self.advance();
            let end = self.code.if_else(marker);
            self.command_seq()?;
            self.code.if_end(end);
        } else {
            self.code.if_end(marker);
        }
        Ok(())
    }

    fn command_seq(&mut self) -> ParseResult {
        if self.current.kind == TokenKind::Begin {
            self.advance();
            self.compound()
        } else {
            self.command()
        }
    }

    fn repeat(&mut self) -> ParseResult {
        self.advance();
        match self.current.kind {
            // No iteration source reaches `repeat all` through the lamp-set
            // interface, so it runs forever like `cycle`.
            TokenKind::Cycle | TokenKind::All => {
                self.advance();
                self.infinite_loop()
            }
            TokenKind::While => {
                self.advance();
                self.conditional_loop(JumpCondition::IfFalse)
            }
            TokenKind::Until => {
                self.advance();
                self.conditional_loop(JumpCondition::IfTrue)
            }
            TokenKind::From => {
                self.advance();
                self.ranged_loop()
            }
            _ if self.at_rvalue() => self.counted_loop(),
            _ => self.fail(format!("Expected loop form, got \"{}\"", self.current.text)),
        }
    }

    fn infinite_loop(&mut self) -> ParseResult {
        self.code.add(Instruction::Loop);
        let top = self.code.mark();
        self.command_seq()?;
        self.code.add_jump_back(JumpCondition::Always, top);
        self.code.add(Instruction::EndLoop);
        Ok(())
    }

    /// `repeat while {…}` / `repeat until {…}`: condition re-evaluated at
    /// the top of every iteration.
    fn conditional_loop(&mut self, exit_when: JumpCondition) -> ParseResult {
        if self.current.kind != TokenKind::Expression {
            return self.fail(format!(
                "Expected expression for repeat, got \"{}\"",
                self.current.text
            ));
        }
        self.code.add(Instruction::Loop);
        let top = self.code.mark();
        self.compile_expression()?;
        self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
        self.advance();
        let exit = self.code.add_jump(exit_when);
        self.command_seq()?;
        self.code.add_jump_back(JumpCondition::Always, top);
        self.code.patch_jump(exit);
        self.code.add(Instruction::EndLoop);
        Ok(())
    }

    /// `repeat N`: the count lives in a hidden frame slot inside the loop
    /// scope and is decremented to zero.
    fn counted_loop(&mut self) -> ParseResult {
        use crate::instruction::Operator;

        let counter = self.gensym();
        self.code.add(Instruction::Loop);
        self.rvalue(Target::Var(counter.clone()))?;
        let top = self.code.mark();
        self.code.add(Instruction::Push(Source::Var(counter.clone())));
        self.code.add(Instruction::PushQ(Value::Integer(0)));
        self.code.add(Instruction::Op(Operator::Gt));
        self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
        let exit = self.code.add_jump(JumpCondition::IfFalse);
        self.command_seq()?;
        self.code.add(Instruction::Push(Source::Var(counter.clone())));
        self.code.add(Instruction::PushQ(Value::Integer(1)));
        self.code.add(Instruction::Op(Operator::Sub));
        self.code.add(Instruction::Pop(Target::Var(counter)));
        self.code.add_jump_back(JumpCondition::Always, top);
        self.code.patch_jump(exit);
        self.code.add(Instruction::EndLoop);
        Ok(())
    }

    /// `repeat from X to Y`: inclusive, stepping +1 or -1 depending on the
    /// bounds, which are evaluated once on entry.
    fn ranged_loop(&mut self) -> ParseResult {
        use crate::instruction::Operator;

        let counter = self.gensym();
        let limit = self.gensym();
        let step = self.gensym();

        self.code.add(Instruction::Loop);
        self.rvalue(Target::Var(counter.clone()))?;
        if self.current.kind != TokenKind::To {
            return self.fail(format!("Expected \"to\", got \"{}\"", self.current.text));
        }
        self.advance();
        self.rvalue(Target::Var(limit.clone()))?;

        // step = if counter <= limit { 1 } else { -1 }
        self.code.add(Instruction::Push(Source::Var(counter.clone())));
        self.code.add(Instruction::Push(Source::Var(limit.clone())));
        self.code.add(Instruction::Op(Operator::Lte));
        self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
        let down = self.code.add_jump(JumpCondition::IfFalse);
        self.code
            .add(Instruction::MoveQ(Value::Integer(1), Target::Var(step.clone())));
        let skip = self.code.add_jump(JumpCondition::Always);
        self.code.patch_jump(down);
        self.code
            .add(Instruction::MoveQ(Value::Integer(-1), Target::Var(step.clone())));
        self.code.patch_jump(skip);

        // continue while (counter - limit) * step <= 0
        let top = self.code.mark();
        self.code.add(Instruction::Push(Source::Var(counter.clone())));
        self.code.add(Instruction::Push(Source::Var(limit)));
        self.code.add(Instruction::Op(Operator::Sub));
        self.code.add(Instruction::Push(Source::Var(step.clone())));
        self.code.add(Instruction::Op(Operator::Mul));
        self.code.add(Instruction::PushQ(Value::Integer(0)));
        self.code.add(Instruction::Op(Operator::Lte));
        self.code.add(Instruction::Pop(Target::Reg(Register::Result)));
        let exit = self.code.add_jump(JumpCondition::IfFalse);
        self.command_seq()?;
        self.code.add(Instruction::Push(Source::Var(counter.clone())));
        self.code.add(Instruction::Push(Source::Var(step)));
        self.code.add(Instruction::Op(Operator::Add));
        self.code.add(Instruction::Pop(Target::Var(counter)));
        self.code.add_jump_back(JumpCondition::Always, top);
        self.code.patch_jump(exit);
        self.code.add(Instruction::EndLoop);
        Ok(())
    }

    fn gensym(&mut self) -> String {
        let name = format!("__loop_{}", self.loop_serial);
        self.loop_serial += 1;
        name
    }

    // ─── plumbing ───────────────────────────────────────────────────────

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn fail<T>(&self, message: String) -> ParseResult<T> {
        Err(ParseError {
            line: self.current.line,
            message,
        })
    }
}

/// Compile a script with the peephole pass.
pub fn parse(source: &str) -> Result<Program, ParseErrors> {
    Parser::new(source).parse()
}

/// Read and compile a script file. IO failures are logged.
pub fn load(path: &Path, optimize: bool) -> Result<Program, LoadError> {
    let source = fs::read_to_string(path).map_err(|e| {
        error!("Error accessing file {}: {}", path.display(), e);
        e
    })?;
    let parser = Parser::new(&source);
    let program = if optimize {
        parser.parse()?
    } else {
        parser.parse_unoptimized()?
    };
    Ok(program)
}
