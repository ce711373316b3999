//! Reader for the s-expression output of the index.
//!
//! The output is a sequence of property lists such as
//! `(:docid 3 :subject "hi" :from (("Ann" . "ann@x.org")) :tags ("a"))`.
//! Lists whose even positions are `:keywords` become [`Value::Plist`],
//! `(a . b)` becomes [`Value::Pair`] and a list made only of pairs
//! becomes an [`Value::Alist`].

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Int(i64),
    /// Quoted strings and bare symbols alike.
    Str(String),
    List(Vec<Value>),
    Pair(Box<Value>, Box<Value>),
    Alist(Vec<(Value, Value)>),
    Plist(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Items of a plain list; `nil` reads as the empty list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Looks up `key` (without the leading colon) in a property list.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Plist(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Dot,
    Nil,
    Int(i64),
    Str(String),
    Keyword(String),
    Eof,
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"')
}

impl<'a> Lexer<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Returns the next token and the offset it starts at.
    fn next_token(&mut self) -> Result<(usize, Token)> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(byte) = self.peek() else {
            return Ok((start, Token::Eof));
        };

        let token = match byte {
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b'"' => self.read_quoted_string()?,
            _ => {
                let atom = self.read_atom();
                if atom == "." {
                    Token::Dot
                } else if atom == "nil" {
                    Token::Nil
                } else if let Some(key) = atom.strip_prefix(':').filter(|k| !k.is_empty()) {
                    Token::Keyword(key.to_string())
                } else if let Ok(n) = atom.parse::<i64>() {
                    Token::Int(n)
                } else {
                    Token::Str(atom)
                }
            }
        };
        Ok((start, token))
    }

    fn read_quoted_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1; // Skip opening quote

        let mut result = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(Error::parse(start, "Unexpected EOF in quoted string"));
            };
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(Error::parse(start, "Unexpected EOF in quoted string"));
                    };
                    self.pos += 1;
                    match escaped {
                        b'n' => result.push(b'\n'),
                        b't' => result.push(b'\t'),
                        // escaped newline is a line continuation
                        b'\n' => {}
                        c => result.push(c),
                    }
                }
                c => result.push(c),
            }
        }

        Ok(Token::Str(String::from_utf8_lossy(&result).into_owned()))
    }

    fn read_atom(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_delimiter(b)) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

/// A list element before the enclosing list is classified.
enum Item {
    Value(Value),
    Keyword(String),
    Dot,
}

fn into_value(item: Item, offset: usize) -> Result<Value> {
    match item {
        Item::Value(v) => Ok(v),
        Item::Keyword(k) => Ok(Value::Str(format!(":{k}"))),
        Item::Dot => Err(Error::parse(offset, "Misplaced '.'")),
    }
}

fn close_list(items: Vec<Item>, offset: usize) -> Result<Value> {
    // (a . b)
    if items.len() == 3 && matches!(items[1], Item::Dot) {
        let mut it = items.into_iter();
        let (Some(Item::Value(a)), _, Some(Item::Value(b))) = (it.next(), it.next(), it.next())
        else {
            return Err(Error::parse(offset, "Malformed dotted pair"));
        };
        return Ok(Value::Pair(Box::new(a), Box::new(b)));
    }

    // (:key value :key value ...)
    let is_plist = !items.is_empty()
        && items.len() % 2 == 0
        && items.chunks(2).all(|kv| {
            matches!(kv[0], Item::Keyword(_)) && matches!(kv[1], Item::Value(_))
        });
    if is_plist {
        let mut entries = Vec::with_capacity(items.len() / 2);
        let mut it = items.into_iter();
        while let (Some(Item::Keyword(k)), Some(Item::Value(v))) = (it.next(), it.next()) {
            entries.push((k, v));
        }
        return Ok(Value::Plist(entries));
    }

    let values = items
        .into_iter()
        .map(|item| into_value(item, offset))
        .collect::<Result<Vec<_>>>()?;

    // ((a . b) (c . d) ...)
    if !values.is_empty() && values.iter().all(|v| matches!(v, Value::Pair(..))) {
        let pairs = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Pair(a, b) => Some((*a, *b)),
                _ => None,
            })
            .collect();
        return Ok(Value::Alist(pairs));
    }

    Ok(Value::List(values))
}

/// Parses a whole sequence of top level expressions.
///
/// Unbalanced parentheses, unterminated strings and stray dots are
/// errors; nothing is silently dropped.
pub fn parse_seq(input: &str) -> Result<Vec<Value>> {
    let mut lexer = Lexer::new(input.as_bytes());
    let mut stack: Vec<(usize, Vec<Item>)> = Vec::new();
    let mut top = Vec::new();

    loop {
        let (offset, token) = lexer.next_token()?;
        let item = match token {
            Token::Eof => break,
            Token::LParen => {
                stack.push((offset, Vec::new()));
                continue;
            }
            Token::RParen => {
                let (_, items) = stack
                    .pop()
                    .ok_or_else(|| Error::parse(offset, "Unexpected ')'"))?;
                Item::Value(close_list(items, offset)?)
            }
            Token::Dot => Item::Dot,
            Token::Keyword(k) => Item::Keyword(k),
            Token::Nil => Item::Value(Value::Nil),
            Token::Int(n) => Item::Value(Value::Int(n)),
            Token::Str(s) => Item::Value(Value::Str(s)),
        };

        match stack.last_mut() {
            Some((_, items)) => items.push(item),
            None => top.push(into_value(item, offset)?),
        }
    }

    if let Some((open, _)) = stack.last() {
        return Err(Error::parse(*open, "Unclosed '('"));
    }
    Ok(top)
}
