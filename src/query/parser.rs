//! Text form of [`Predicate`].
//!
//! ```text
//! predicate  := or
//! or         := and (("OR" | "||") and)*
//! and        := not (("AND" | "&&") not)*
//! not        := ("NOT" | "!") not | "(" predicate ")" | comparison
//! comparison := key_path op operand
//!             | key_path ("BETWEEN" | "IN") "{" literal ("," literal)* "}"
//! op         := "==" | "=" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//!             | ("LIKE" | "BEGINSWITH" | "ENDSWITH" | "CONTAINS") ["[c]"]
//! ```

use super::pattern::escape_like;
use super::predicate::{CompareOp, Predicate};
use crate::core::{DbError, Result, Value};
use crate::list::KeyPath;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Double(f64),
    Op(&'static str),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
}

fn invalid(message: impl Into<String>) -> DbError {
    DbError::InvalidPredicate(message.into())
}

// ============================================================================
// Lexer
// ============================================================================

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '\'' | '"' => {
                let (literal, end) = read_string(&chars, pos)?;
                pos = end;
                tokens.push((start, Token::Str(literal)));
                continue;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(pos + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let (number, end) = read_number(&chars, pos)?;
                pos = end;
                tokens.push((start, number));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = pos;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                tokens.push((start, Token::Ident(chars[pos..end].iter().collect())));
                pos = end;
                continue;
            }
            _ => {
                let next = chars.get(pos + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => ("==", 2),
                    ('=', _) => ("==", 1),
                    ('!', Some('=')) => ("!=", 2),
                    ('<', Some('>')) => ("!=", 2),
                    ('<', Some('=')) => ("<=", 2),
                    ('>', Some('=')) => (">=", 2),
                    ('<', _) => ("<", 1),
                    ('>', _) => (">", 1),
                    ('&', Some('&')) => ("&&", 2),
                    ('|', Some('|')) => ("||", 2),
                    ('!', _) => ("!", 1),
                    ('.', _) => (".", 1),
                    _ => return Err(invalid(format!("Unexpected character '{}' at {}", c, pos))),
                };
                pos += width;
                tokens.push((start, Token::Op(op)));
                continue;
            }
        };
        tokens.push((start, token));
        pos += 1;
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut literal = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '\\' if pos + 1 < chars.len() => {
                literal.push(chars[pos + 1]);
                pos += 2;
            }
            c if c == quote => return Ok((literal, pos + 1)),
            c => {
                literal.push(c);
                pos += 1;
            }
        }
    }
    Err(invalid(format!("Unterminated string starting at {}", start)))
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut end = start + 1;
    let mut floating = false;
    while end < chars.len() {
        match chars[end] {
            c if c.is_ascii_digit() => {}
            '.' if !floating && chars.get(end + 1).is_some_and(|n| n.is_ascii_digit()) => {
                floating = true;
            }
            'e' | 'E' => {
                floating = true;
                if matches!(chars.get(end + 1), Some('+') | Some('-')) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }

    let text: String = chars[start..end].iter().collect();
    let token = if floating {
        text.parse::<f64>().map(Token::Double).ok()
    } else {
        text.parse::<i64>().map(Token::Int).ok()
    };
    token
        .map(|t| (t, end))
        .ok_or_else(|| invalid(format!("Invalid number '{}'", text)))
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!("Expected {:?}, found {:?}", expected, token))),
            None => Err(invalid(format!("Expected {:?}, found end of input", expected))),
        }
    }

    /// Consume a keyword (case-insensitive) or an operator spelling of it.
    fn eat_keyword(&mut self, keyword: &str, symbol: Option<&str>) -> bool {
        let hit = match self.peek() {
            Some(Token::Ident(word)) => word.eq_ignore_ascii_case(keyword),
            Some(Token::Op(op)) => symbol == Some(*op),
            _ => false,
        };
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn parse_or(&mut self) -> Result<Predicate> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR", Some("||")) {
            left = left.or(self.parse_and()?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND", Some("&&")) {
            left = left.and(self.parse_not()?);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Predicate> {
        if self.eat_keyword("NOT", Some("!")) {
            return Ok(self.parse_not()?.negate());
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_key_path(&mut self) -> Result<KeyPath> {
        let mut text = match self.advance() {
            Some(Token::Ident(name)) => name,
            other => return Err(invalid(format!("Expected a key path, found {:?}", other))),
        };
        while self.peek() == Some(&Token::Op(".")) {
            self.pos += 1;
            match self.advance() {
                Some(Token::Ident(name)) => {
                    text.push('.');
                    text.push_str(&name);
                }
                other => return Err(invalid(format!("Expected a property name, found {:?}", other))),
            }
        }
        if text.eq_ignore_ascii_case("self") {
            return Ok(KeyPath::default());
        }
        KeyPath::parse(&text)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Double(d)) => Ok(Value::Double(d)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "nil" => Ok(Value::Null),
                _ => Err(invalid(format!("Expected a literal, found '{}'", word))),
            },
            other => Err(invalid(format!("Expected a literal, found {:?}", other))),
        }
    }

    fn parse_literal_set(&mut self) -> Result<Vec<Value>> {
        self.expect(Token::LBrace)?;
        let mut values = vec![self.parse_literal()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            values.push(self.parse_literal()?);
        }
        self.expect(Token::RBrace)?;
        Ok(values)
    }

    /// Optional `[c]` after a string operator
    fn parse_case_flag(&mut self) -> Result<bool> {
        if self.peek() != Some(&Token::LBracket) {
            return Ok(false);
        }
        self.pos += 1;
        match self.advance() {
            Some(Token::Ident(flag)) if flag.eq_ignore_ascii_case("c") => {}
            other => return Err(invalid(format!("Unknown operator option {:?}", other))),
        }
        self.expect(Token::RBracket)?;
        Ok(true)
    }

    fn parse_pattern(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(invalid(format!("Expected a string pattern, found {:?}", other))),
        }
    }

    fn parse_comparison(&mut self) -> Result<Predicate> {
        let path = self.parse_key_path()?;
        let op = self
            .advance()
            .ok_or_else(|| invalid(format!("Expected an operator after '{}'", path)))?;

        let compare = match op {
            Token::Op("==") => CompareOp::Eq,
            Token::Op("!=") => CompareOp::Ne,
            Token::Op("<") => CompareOp::Lt,
            Token::Op("<=") => CompareOp::Le,
            Token::Op(">") => CompareOp::Gt,
            Token::Op(">=") => CompareOp::Ge,
            Token::Ident(word) => {
                let word = word.to_ascii_uppercase();
                return match word.as_str() {
                    "BETWEEN" => {
                        let bounds = self.parse_literal_set()?;
                        match <[Value; 2]>::try_from(bounds) {
                            Ok([low, high]) => Ok(Predicate::Between { path, low, high }),
                            Err(_) => Err(invalid("BETWEEN needs exactly two bounds")),
                        }
                    }
                    "IN" => Ok(Predicate::In {
                        path,
                        values: self.parse_literal_set()?,
                    }),
                    "LIKE" | "BEGINSWITH" | "ENDSWITH" | "CONTAINS" => {
                        let case_insensitive = self.parse_case_flag()?;
                        let operand = self.parse_pattern()?;
                        let pattern = match word.as_str() {
                            "LIKE" => operand,
                            "BEGINSWITH" => format!("{}%", escape_like(&operand)),
                            "ENDSWITH" => format!("%{}", escape_like(&operand)),
                            _ => format!("%{}%", escape_like(&operand)),
                        };
                        Ok(Predicate::Like {
                            path,
                            pattern,
                            case_insensitive,
                        })
                    }
                    _ => Err(invalid(format!("Unknown operator '{}'", word))),
                };
            }
            other => return Err(invalid(format!("Expected an operator, found {:?}", other))),
        };

        let value = self.parse_literal()?;
        if compare == CompareOp::Eq && value.is_null() {
            return Ok(Predicate::IsNull { path });
        }
        Ok(Predicate::Compare {
            path,
            op: compare,
            value,
        })
    }
}

pub(crate) fn parse(text: &str) -> Result<Predicate> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(invalid("Empty predicate"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.parse_or()?;
    if let Some((offset, token)) = parser.tokens.get(parser.pos) {
        return Err(invalid(format!("Unexpected {:?} at {}", token, offset)));
    }
    Ok(predicate)
}
