//! Lexical analysis for lamp scripts.
//!
//! Scripts are free-form text: tokens are separated by whitespace, `#`
//! starts a comment running to end of line, strings are double-quoted with
//! no escapes, and `{ … }` captures an expression verbatim for the
//! expression compiler. Every token carries the line it started on.

use crate::instruction::Register;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    All,
    And,
    Assign,
    At,
    Begin,
    Breakpoint,
    Cycle,
    Define,
    Else,
    End,
    Eof,
    /// The text between `{` and `}`, braces stripped.
    Expression,
    From,
    Get,
    Group,
    If,
    LiteralString,
    Location,
    Logical,
    Name,
    Number,
    Off,
    On,
    Or,
    Pause,
    Raw,
    Register,
    Repeat,
    Set,
    TimePattern,
    To,
    Units,
    Unknown,
    Until,
    Wait,
    While,
    With,
    Zone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: u32) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
        }
    }
}

/// Streaming lexer. `next_token` yields tokens until `Eof`, which then
/// repeats forever.
pub struct Lex {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl Lex {
    pub fn new(input: &str) -> Self {
        Lex {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_blanks();
        let line = self.line;
        match self.peek() {
            None => Token::new(TokenKind::Eof, "", line),
            Some('"') => self.string_literal(line),
            Some('{') => self.expression(line),
            Some(_) => self.word(line),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        c
    }

    fn skip_blanks(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn string_literal(&mut self, line: u32) -> Token {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Token::new(TokenKind::LiteralString, text, line),
                Some(c) => text.push(c),
                None => return Token::new(TokenKind::Unknown, text, line),
            }
        }
    }

    fn expression(&mut self, line: u32) -> Token {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('}') => return Token::new(TokenKind::Expression, text, line),
                Some(c) => text.push(c),
                None => return Token::new(TokenKind::Unknown, text, line),
            }
        }
    }

    fn word(&mut self, line: u32) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '"' || c == '{' || c == '#' {
                break;
            }
            text.push(c);
            self.advance();
        }
        let kind = classify(&text);
        Token::new(kind, text, line)
    }
}

fn classify(word: &str) -> TokenKind {
    if Register::script(word).is_some() {
        return TokenKind::Register;
    }
    match word {
        "all" => TokenKind::All,
        "and" => TokenKind::And,
        "assign" => TokenKind::Assign,
        "at" => TokenKind::At,
        "begin" => TokenKind::Begin,
        "breakpoint" => TokenKind::Breakpoint,
        "cycle" => TokenKind::Cycle,
        "define" => TokenKind::Define,
        "else" => TokenKind::Else,
        "end" => TokenKind::End,
        "from" => TokenKind::From,
        "get" => TokenKind::Get,
        "group" => TokenKind::Group,
        "if" => TokenKind::If,
        "location" => TokenKind::Location,
        "logical" => TokenKind::Logical,
        "off" => TokenKind::Off,
        "on" => TokenKind::On,
        "or" => TokenKind::Or,
        "pause" => TokenKind::Pause,
        "raw" => TokenKind::Raw,
        "repeat" => TokenKind::Repeat,
        "set" => TokenKind::Set,
        "to" => TokenKind::To,
        "units" => TokenKind::Units,
        "until" => TokenKind::Until,
        "wait" => TokenKind::Wait,
        "while" => TokenKind::While,
        "with" => TokenKind::With,
        "zone" => TokenKind::Zone,
        _ => {
            if is_time_pattern(word) {
                TokenKind::TimePattern
            } else if is_number(word) {
                TokenKind::Number
            } else if is_name(word) {
                TokenKind::Name
            } else {
                TokenKind::Unknown
            }
        }
    }
}

fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    if digits.is_empty() {
        return false;
    }
    match digits.split_once('.') {
        None => digits.chars().all(|c| c.is_ascii_digit()),
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
    }
}

fn is_time_pattern(word: &str) -> bool {
    match word.split_once(':') {
        Some((hours, minutes)) => {
            let ok = |field: &str| {
                (1..=2).contains(&field.len())
                    && field.chars().all(|c| c.is_ascii_digit() || c == '*')
            };
            ok(hours) && ok(minutes)
        }
        None => false,
    }
}

fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lex = Lex::new(input);
        let mut result = Vec::new();
        loop {
            let token = lex.next_token();
            if token.kind == TokenKind::Eof {
                return result;
            }
            result.push(token.kind);
        }
    }

    #[test]
    fn test_keywords_and_registers() {
        assert_eq!(
            kinds("set hue 5 on off group location"),
            vec![
                TokenKind::Set,
                TokenKind::Register,
                TokenKind::Number,
                TokenKind::On,
                TokenKind::Off,
                TokenKind::Group,
                TokenKind::Location,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("5 5.0 -2 12.75"),
            vec![TokenKind::Number; 4]
        );
        assert_eq!(kinds("5."), vec![TokenKind::Unknown]);
        assert_eq!(kinds(".5"), vec![TokenKind::Unknown]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("#abcde \n hue 5 \n #efghi \n "),
            vec![TokenKind::Register, TokenKind::Number]
        );
    }

    #[test]
    fn test_string_with_spaces() {
        let mut lex = Lex::new("set \"name with spaces\"");
        assert_eq!(lex.next_token().kind, TokenKind::Set);
        let token = lex.next_token();
        assert_eq!(token.kind, TokenKind::LiteralString);
        assert_eq!(token.text, "name with spaces");
    }

    #[test]
    fn test_expression_capture() {
        let mut lex = Lex::new("brightness {brightness + 5}");
        assert_eq!(lex.next_token().kind, TokenKind::Register);
        let token = lex.next_token();
        assert_eq!(token.kind, TokenKind::Expression);
        assert_eq!(token.text, "brightness + 5");
    }

    #[test]
    fn test_time_patterns() {
        assert_eq!(
            kinds("12:30 *:00 1*:*5"),
            vec![TokenKind::TimePattern; 3]
        );
        assert_eq!(kinds("12:305"), vec![TokenKind::Unknown]);
    }

    #[test]
    fn test_line_numbers() {
        let mut lex = Lex::new("on \"Top\"\noff \"Bottom\"");
        assert_eq!(lex.next_token().line, 1);
        assert_eq!(lex.next_token().line, 1);
        assert_eq!(lex.next_token().line, 2);
        assert_eq!(lex.next_token().line, 2);
    }

    #[test]
    fn test_unknown_punctuation() {
        assert_eq!(kinds("@!"), vec![TokenKind::Unknown]);
    }
}
