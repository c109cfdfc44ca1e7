//! 口令表达式求值。
//!
//! 页面里的 `batoPass` 不是 JSON，而是一段类 JSFuck 的 JS 表达式（`[]`、`!`、一元 `+`、字符串拼接）。
//! 这里只实现页面实际会出现的子集：字面量、数组字面量、括号、一元 `! + -`、二元 `+ - * / %`、
//! 以及 `x[i]` 下标。没有标识符、没有函数调用。

use thiserror::Error;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid escape sequence at offset {0}")]
    BadEscape(usize),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nested deeper than {MAX_DEPTH}")]
    TooDeep,
}

/// JS 运行时值的最小子集。
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<JsValue>),
}

impl JsValue {
    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Num(n) => format_number(*n),
            JsValue::Str(s) => s.clone(),
            JsValue::Array(items) => items
                .iter()
                .map(|v| match v {
                    JsValue::Undefined => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn to_primitive(&self) -> JsValue {
        match self {
            JsValue::Array(_) => JsValue::Str(self.to_js_string()),
            other => other.clone(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Bool(b) => f64::from(u8::from(*b)),
            JsValue::Num(n) => *n,
            JsValue::Str(s) => string_to_number(s),
            JsValue::Array(_) => self.to_primitive().to_number(),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            JsValue::Undefined => false,
            JsValue::Bool(b) => *b,
            JsValue::Num(n) => *n != 0.0 && !n.is_nan(),
            JsValue::Str(s) => !s.is_empty(),
            JsValue::Array(_) => true,
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust 会接受 "inf"/"nan"，JS 不会。
    if t.chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{n}");
    }
    let sci = format!("{n:e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => sci,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Bool(bool),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let simple = match c {
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '!' => Some(Token::Bang),
            _ => None,
        };
        if let Some(tok) = simple {
            tokens.push(tok);
            i += 1;
            continue;
        }

        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j], '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError::UnexpectedChar(c, start))?;
            tokens.push(Token::Num(value));
        } else if c == '\'' || c == '"' {
            let (s, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(s));
            i = next;
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "true" => tokens.push(Token::Bool(true)),
                "false" => tokens.push(Token::Bool(false)),
                _ => return Err(ExprError::UnexpectedToken(word)),
            }
        } else {
            return Err(ExprError::UnexpectedChar(c, i));
        }
    }
    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let esc = *chars.get(i + 1).ok_or(ExprError::UnterminatedString(start))?;
        i += 2;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'x' | 'u' => {
                let width = if esc == 'x' { 2 } else { 4 };
                let digits: String = chars
                    .get(i..i + width)
                    .ok_or(ExprError::BadEscape(i - 2))?
                    .iter()
                    .collect();
                let code =
                    u32::from_str_radix(&digits, 16).map_err(|_| ExprError::BadEscape(i - 2))?;
                out.push(char::from_u32(code).ok_or(ExprError::BadEscape(i - 2))?);
                i += width;
            }
            other => out.push(other),
        }
    }
    Err(ExprError::UnterminatedString(start))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let got = self.next()?;
        if got == want {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(format!("{got:?}, expected {want:?}")))
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<JsValue, ExprError> {
        self.enter()?;
        let mut lhs = self.term()?;
        while let Some(op) = self.peek().cloned() {
            if !matches!(op, Token::Plus | Token::Minus) {
                break;
            }
            self.pos += 1;
            let rhs = self.term()?;
            lhs = if op == Token::Plus {
                add(&lhs, &rhs)
            } else {
                JsValue::Num(lhs.to_number() - rhs.to_number())
            };
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<JsValue, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            let (a, b) = match op {
                Token::Star | Token::Slash | Token::Percent => {
                    self.pos += 1;
                    (lhs.to_number(), self.unary()?.to_number())
                }
                _ => break,
            };
            lhs = JsValue::Num(match op {
                Token::Star => a * b,
                Token::Slash => a / b,
                _ => a % b,
            });
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<JsValue, ExprError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(JsValue::Bool(!v.truthy()))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(JsValue::Num(v.to_number()))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(JsValue::Num(-v.to_number()))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<JsValue, ExprError> {
        let mut value = self.primary()?;
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            let index = self.expression()?;
            self.expect(Token::RBracket)?;
            value = index_into(&value, &index);
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<JsValue, ExprError> {
        match self.next()? {
            Token::Num(n) => Ok(JsValue::Num(n)),
            Token::Str(s) => Ok(JsValue::Str(s)),
            Token::Bool(b) => Ok(JsValue::Bool(b)),
            Token::LParen => {
                let v = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(JsValue::Array(items));
                }
                loop {
                    items.push(self.expression()?);
                    match self.next()? {
                        Token::Comma => continue,
                        Token::RBracket => break,
                        other => return Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                    }
                }
                Ok(JsValue::Array(items))
            }
            other => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

fn add(lhs: &JsValue, rhs: &JsValue) -> JsValue {
    let (l, r) = (lhs.to_primitive(), rhs.to_primitive());
    if matches!(l, JsValue::Str(_)) || matches!(r, JsValue::Str(_)) {
        JsValue::Str(l.to_js_string() + &r.to_js_string())
    } else {
        JsValue::Num(l.to_number() + r.to_number())
    }
}

fn index_into(base: &JsValue, index: &JsValue) -> JsValue {
    let idx = index.to_number();
    if idx.is_nan() || idx < 0.0 || idx.fract() != 0.0 {
        return JsValue::Undefined;
    }
    let idx = idx as usize;
    match base {
        JsValue::Str(s) => s
            .chars()
            .nth(idx)
            .map(|c| JsValue::Str(c.to_string()))
            .unwrap_or(JsValue::Undefined),
        JsValue::Array(items) => items.get(idx).cloned().unwrap_or(JsValue::Undefined),
        _ => JsValue::Undefined,
    }
}

pub fn evaluate(src: &str) -> Result<JsValue, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::UnexpectedToken(format!("{extra:?}")));
    }
    Ok(value)
}

/// 求值并按 JS 的 `String(x)` 规则转成字符串。
pub fn evaluate_to_string(src: &str) -> Result<String, ExprError> {
    evaluate(src).map(|v| v.to_js_string())
}
