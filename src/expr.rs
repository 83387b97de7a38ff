//! Compiles `{ … }` expressions into postfix stack operations.
//!
//! The parser hands over the raw text between the braces. The output is a
//! sequence of `PUSHQ`/`PUSH`/`OP` instructions appended to the code
//! generator; executing them leaves the expression's value on top of the
//! value stack. Literals and macros become immediates, variables and
//! registers are read at run time.
//!
//! Precedence, loosest first: `or`, `and`, comparisons, `+ -`, `* / %`,
//! unary `- !`. All binary operators are left-associative.

use thiserror::Error;

use crate::code_gen::CodeGen;
use crate::instruction::{Instruction, Operator, Register, Source};
use crate::symbol_table::CallContext;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot parse expression at \"{0}\"")]
pub struct ExprError(pub String);

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Number(Value),
    Str(String),
    Name(String),
    Reg(Register),
    Op(Operator),
    Bang,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<ExprToken>, ExprError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(ExprToken::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(ExprToken::Op(Operator::Add));
                i += 1;
            }
            '-' => {
                tokens.push(ExprToken::Op(Operator::Sub));
                i += 1;
            }
            '*' => {
                tokens.push(ExprToken::Op(Operator::Mul));
                i += 1;
            }
            '/' => {
                tokens.push(ExprToken::Op(Operator::Div));
                i += 1;
            }
            '%' => {
                tokens.push(ExprToken::Op(Operator::Mod));
                i += 1;
            }
            '=' => {
                tokens.push(ExprToken::Op(Operator::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ExprToken::Op(Operator::NotEq));
                i += 2;
            }
            '!' => {
                tokens.push(ExprToken::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ExprToken::Op(Operator::Lte));
                i += 2;
            }
            '<' => {
                tokens.push(ExprToken::Op(Operator::Lt));
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(ExprToken::Op(Operator::Gte));
                i += 2;
            }
            '>' => {
                tokens.push(ExprToken::Op(Operator::Gt));
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '"' {
                    j += 1;
                }
                if j == chars.len() {
                    return Err(ExprError(chars[i..].iter().collect()));
                }
                tokens.push(ExprToken::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = if text.contains('.') {
                    text.parse::<f64>().map(Value::Float).ok()
                } else {
                    text.parse::<i64>().map(Value::Integer).ok()
                };
                match value {
                    Some(v) => tokens.push(ExprToken::Number(v)),
                    None => return Err(ExprError(text)),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(ExprToken::Op(Operator::And)),
                    "or" => tokens.push(ExprToken::Op(Operator::Or)),
                    _ => match Register::script(&word) {
                        Some(reg) => tokens.push(ExprToken::Reg(reg)),
                        None => tokens.push(ExprToken::Name(word)),
                    },
                }
            }
            _ => return Err(ExprError(chars[i..].iter().collect())),
        }
    }
    Ok(tokens)
}

/// Recursive-descent compiler for one expression.
pub struct ExprParser<'a> {
    text: &'a str,
    context: &'a CallContext,
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    pub fn new(text: &'a str, context: &'a CallContext) -> Self {
        ExprParser {
            text,
            context,
            tokens: Vec::new(),
            pos: 0,
        }
    }

    /// Compile the expression, appending its postfix code to `code`.
    pub fn generate_code(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.tokens = tokenize(self.text)?;
        self.pos = 0;
        self.or_expr(code)?;
        if self.pos != self.tokens.len() {
            return Err(self.error());
        }
        Ok(())
    }

    fn error(&self) -> ExprError {
        ExprError(match self.tokens.get(self.pos) {
            Some(token) => format!("{:?}", token),
            None => self.text.to_string(),
        })
    }

    fn peek_op(&self) -> Option<Operator> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        code: &mut CodeGen,
        ops: &[Operator],
        next: fn(&mut Self, &mut CodeGen) -> Result<(), ExprError>,
    ) -> Result<(), ExprError> {
        next(self, code)?;
        while let Some(op) = self.peek_op() {
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            next(self, code)?;
            code.add(Instruction::Op(op));
        }
        Ok(())
    }

    fn or_expr(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.binary_level(code, &[Operator::Or], Self::and_expr)
    }

    fn and_expr(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.binary_level(code, &[Operator::And], Self::equality)
    }

    fn equality(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.binary_level(
            code,
            &[
                Operator::Eq,
                Operator::NotEq,
                Operator::Lt,
                Operator::Lte,
                Operator::Gt,
                Operator::Gte,
            ],
            Self::additive,
        )
    }

    fn additive(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.binary_level(code, &[Operator::Add, Operator::Sub], Self::multiplicative)
    }

    fn multiplicative(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        self.binary_level(
            code,
            &[Operator::Mul, Operator::Div, Operator::Mod],
            Self::unary,
        )
    }

    fn unary(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(Operator::Sub)) => {
                self.pos += 1;
                self.unary(code)?;
                code.add(Instruction::Op(Operator::UnaryMinus));
                Ok(())
            }
            Some(ExprToken::Bang) => {
                self.pos += 1;
                self.unary(code)?;
                code.add(Instruction::Op(Operator::Not));
                Ok(())
            }
            _ => self.primary(code),
        }
    }

    fn primary(&mut self, code: &mut CodeGen) -> Result<(), ExprError> {
        let token = match self.tokens.get(self.pos) {
            Some(token) => token.clone(),
            None => return Err(self.error()),
        };
        match token {
            ExprToken::Number(value) => {
                self.pos += 1;
                code.add(Instruction::PushQ(value));
                Ok(())
            }
            ExprToken::Str(text) => {
                self.pos += 1;
                code.add(Instruction::PushQ(Value::Str(text)));
                Ok(())
            }
            ExprToken::Reg(reg) => {
                self.pos += 1;
                code.add(Instruction::Push(Source::Reg(reg)));
                Ok(())
            }
            ExprToken::Name(name) => {
                self.pos += 1;
                match self.context.get_macro(&name) {
                    Some(value) => code.add(Instruction::PushQ(value.clone())),
                    None => code.add(Instruction::Push(Source::Var(name))),
                };
                Ok(())
            }
            ExprToken::LParen => {
                self.pos += 1;
                self.or_expr(code)?;
                match self.tokens.get(self.pos) {
                    Some(ExprToken::RParen) => {
                        self.pos += 1;
                        Ok(())
                    }
                    _ => Err(self.error()),
                }
            }
            _ => Err(self.error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction as I;

    fn compile(text: &str) -> Vec<Instruction> {
        let context = CallContext::new();
        compile_with(text, &context)
    }

    fn compile_with(text: &str, context: &CallContext) -> Vec<Instruction> {
        let mut code = CodeGen::new();
        ExprParser::new(text, context)
            .generate_code(&mut code)
            .expect("expression should compile");
        code.program().code
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            compile("1 + 2 * 3"),
            vec![
                I::PushQ(Value::Integer(1)),
                I::PushQ(Value::Integer(2)),
                I::PushQ(Value::Integer(3)),
                I::Op(Operator::Mul),
                I::Op(Operator::Add),
            ]
        );
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            compile("(1 + 2) * 3"),
            vec![
                I::PushQ(Value::Integer(1)),
                I::PushQ(Value::Integer(2)),
                I::Op(Operator::Add),
                I::PushQ(Value::Integer(3)),
                I::Op(Operator::Mul),
            ]
        );
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(
            compile("10 - 2 - 3"),
            vec![
                I::PushQ(Value::Integer(10)),
                I::PushQ(Value::Integer(2)),
                I::Op(Operator::Sub),
                I::PushQ(Value::Integer(3)),
                I::Op(Operator::Sub),
            ]
        );
    }

    #[test]
    fn test_registers_and_comparison() {
        assert_eq!(
            compile("brightness < 50.0"),
            vec![
                I::Push(Source::Reg(Register::Brightness)),
                I::PushQ(Value::Float(50.0)),
                I::Op(Operator::Lt),
            ]
        );
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(
            compile("hue > 10 and hue < 20 or !power"),
            vec![
                I::Push(Source::Reg(Register::Hue)),
                I::PushQ(Value::Integer(10)),
                I::Op(Operator::Gt),
                I::Push(Source::Reg(Register::Hue)),
                I::PushQ(Value::Integer(20)),
                I::Op(Operator::Lt),
                I::Op(Operator::And),
                I::Push(Source::Reg(Register::Power)),
                I::Op(Operator::Not),
                I::Op(Operator::Or),
            ]
        );
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(
            compile("-x"),
            vec![
                I::Push(Source::Var("x".to_string())),
                I::Op(Operator::UnaryMinus),
            ]
        );
    }

    #[test]
    fn test_macro_becomes_immediate() {
        let mut context = CallContext::new();
        context.add_macro("half", Value::Integer(50));
        assert_eq!(
            compile_with("half + 1", &context),
            vec![
                I::PushQ(Value::Integer(50)),
                I::PushQ(Value::Integer(1)),
                I::Op(Operator::Add),
            ]
        );
    }

    #[test]
    fn test_string_equality() {
        assert_eq!(
            compile("name = \"Top\""),
            vec![
                I::Push(Source::Var("name".to_string())),
                I::PushQ(Value::Str("Top".to_string())),
                I::Op(Operator::Eq),
            ]
        );
    }

    #[test]
    fn test_errors() {
        let context = CallContext::new();
        let mut code = CodeGen::new();
        assert!(ExprParser::new("1 +", &context).generate_code(&mut code).is_err());
        assert!(ExprParser::new("(1 + 2", &context).generate_code(&mut code).is_err());
        assert!(ExprParser::new("@", &context).generate_code(&mut code).is_err());
        assert!(ExprParser::new("1 2", &context).generate_code(&mut code).is_err());
    }
}
