//! Arithmetic expression evaluator.
//!
//! Supports `+ - * / // % **`, parentheses, unary signs, the constants `pi`
//! and `e`, and the functions `sin cos tan sqrt log`. Integer arithmetic stays
//! integral (checked for overflow) except for true division, which always
//! produces a float.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{parse_args, EntryPoint, Parameters, UnitError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("expression cannot be empty")]
    Empty,
    #[error("invalid character '{0}' in expression")]
    InvalidCharacter(char),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("invalid syntax: {0}")]
    Syntax(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("float division by zero")]
    FloatDivisionByZero,
    #[error("integer division or modulo by zero")]
    ModuloByZero,
    #[error("0.0 cannot be raised to a negative power")]
    ZeroNegativePower,
    #[error("math domain error")]
    Domain,
    #[error("integer overflow")]
    Overflow,
    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(value) => value == 0,
            Self::Float(value) => value == 0.0,
        }
    }

    pub fn to_json(self) -> Result<Value, EvalError> {
        match self {
            Self::Int(value) => Ok(Value::from(value)),
            Self::Float(value) => serde_json::Number::from_f64(value)
                .map(Value::Number)
                .ok_or(EvalError::NotFinite),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalculateArgs {
    expression: String,
}

pub struct Calculate;

#[async_trait]
impl EntryPoint for Calculate {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        let args: CalculateArgs = parse_args(params)?;
        let expression = args.expression.trim();
        let value = evaluate(expression).map_err(|err| UnitError::failed(err.to_string()))?;
        let result = value
            .to_json()
            .map_err(|err| UnitError::failed(err.to_string()))?;
        Ok(json!({
            "expression": expression,
            "result": result,
            "type": value.type_name(),
        }))
    }
}

pub fn evaluate(expression: &str) -> Result<Number, EvalError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(EvalError::Syntax(format!("unexpected {}", token.describe())));
    }
    if let Number::Float(value) = value {
        if !value.is_finite() {
            return Err(EvalError::NotFinite);
        }
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Num(Number::Int(value)) => format!("number {value}"),
            Self::Num(Number::Float(value)) => format!("number {value}"),
            Self::Ident(name) => format!("name '{name}'"),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::DoubleStar => "'**'".into(),
            Self::Slash => "'/'".into(),
            Self::DoubleSlash => "'//'".into(),
            Self::Percent => "'%'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Comma => "','".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation only when the exponent has digits, so `2*e` still
                // reads the constant.
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(EvalError::InvalidCharacter(other)),
        }
    }

    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Number, EvalError> {
    let is_float = literal.contains(['.', 'e', 'E']);
    if is_float {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| EvalError::InvalidNumber(literal.to_string()))
    } else {
        literal
            .parse::<i64>()
            .map(Number::Int)
            .map_err(|_| EvalError::Overflow)
    }
}

// Every recursive path (parentheses, calls, signs, exponents) passes through
// `unary`, so bounding its depth bounds the parser's stack use.
const MAX_NESTING: usize = 200;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvalError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(EvalError::Syntax(format!(
                "expected {} but found {}",
                expected.describe(),
                token.describe()
            ))),
            None => Err(EvalError::Syntax(format!(
                "expected {} at end of expression",
                expected.describe()
            ))),
        }
    }

    fn expr(&mut self) -> Result<Number, EvalError> {
        let mut lhs = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = add(lhs, rhs)?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = sub(lhs, rhs)?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Number, EvalError> {
        let mut lhs = self.unary()?;
        loop {
            let op: fn(Number, Number) -> Result<Number, EvalError> = match self.peek() {
                Some(Token::Star) => mul,
                Some(Token::Slash) => div,
                Some(Token::DoubleSlash) => floor_div,
                Some(Token::Percent) => modulo,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = op(lhs, rhs)?;
        }
    }

    fn unary(&mut self) -> Result<Number, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::Syntax("expression is nested too deeply".into()));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<Number, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                neg(self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // `**` binds tighter than unary minus on its left and is right-associative.
    fn power(&mut self) -> Result<Number, EvalError> {
        let base = self.atom()?;
        if matches!(self.peek(), Some(Token::DoubleStar)) {
            self.pos += 1;
            let exponent = self.unary()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, EvalError> {
        match self.next() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    self.call(&name)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(EvalError::Syntax(format!("unexpected {}", token.describe()))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }

    fn call(&mut self, name: &str) -> Result<Number, EvalError> {
        let mut args = vec![self.expr()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            args.push(self.expr()?);
        }
        self.expect(Token::RParen)?;
        apply_function(name, &args)
    }
}

fn constant(name: &str) -> Result<Number, EvalError> {
    match name {
        "pi" => Ok(Number::Float(std::f64::consts::PI)),
        "e" => Ok(Number::Float(std::f64::consts::E)),
        other => Err(EvalError::UnknownName(other.to_string())),
    }
}

fn apply_function(name: &str, args: &[Number]) -> Result<Number, EvalError> {
    let arity_error = |expected: &str| {
        EvalError::Syntax(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        ))
    };
    let x = args[0].as_f64();
    let value = match (name, args.len()) {
        ("sin", 1) => x.sin(),
        ("cos", 1) => x.cos(),
        ("tan", 1) => x.tan(),
        ("sqrt", 1) => {
            if x < 0.0 {
                return Err(EvalError::Domain);
            }
            x.sqrt()
        }
        ("log", 1) => {
            if x <= 0.0 {
                return Err(EvalError::Domain);
            }
            x.ln()
        }
        ("log", 2) => {
            let base = args[1].as_f64();
            if x <= 0.0 || base <= 0.0 {
                return Err(EvalError::Domain);
            }
            if base == 1.0 {
                return Err(EvalError::FloatDivisionByZero);
            }
            x.ln() / base.ln()
        }
        ("sin" | "cos" | "tan" | "sqrt", _) => return Err(arity_error("exactly 1")),
        ("log", _) => return Err(arity_error("1 or 2")),
        (other, _) => return Err(EvalError::UnknownName(other.to_string())),
    };
    Ok(Number::Float(value))
}

fn add(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map(Number::Int)
            .ok_or(EvalError::Overflow),
        _ => Ok(Number::Float(a.as_f64() + b.as_f64())),
    }
}

fn sub(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_sub(b)
            .map(Number::Int)
            .ok_or(EvalError::Overflow),
        _ => Ok(Number::Float(a.as_f64() - b.as_f64())),
    }
}

fn mul(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_mul(b)
            .map(Number::Int)
            .ok_or(EvalError::Overflow),
        _ => Ok(Number::Float(a.as_f64() * b.as_f64())),
    }
}

fn div(a: Number, b: Number) -> Result<Number, EvalError> {
    if b.is_zero() {
        return Err(match (a, b) {
            (Number::Int(_), Number::Int(_)) => EvalError::DivisionByZero,
            _ => EvalError::FloatDivisionByZero,
        });
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

fn floor_div(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(_), Number::Int(0)) => Err(EvalError::ModuloByZero),
        (Number::Int(a), Number::Int(b)) => {
            let quotient = a.checked_div(b).ok_or(EvalError::Overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(Number::Int(quotient - 1))
            } else {
                Ok(Number::Int(quotient))
            }
        }
        _ if b.is_zero() => Err(EvalError::FloatDivisionByZero),
        _ => Ok(Number::Float((a.as_f64() / b.as_f64()).floor())),
    }
}

// Result takes the sign of the divisor.
fn modulo(a: Number, b: Number) -> Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(_), Number::Int(0)) => Err(EvalError::ModuloByZero),
        (Number::Int(a), Number::Int(b)) => {
            let rem = a.checked_rem(b).ok_or(EvalError::Overflow)?;
            if rem != 0 && ((rem < 0) != (b < 0)) {
                Ok(Number::Int(rem + b))
            } else {
                Ok(Number::Int(rem))
            }
        }
        _ if b.is_zero() => Err(EvalError::FloatDivisionByZero),
        _ => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let rem = a % b;
            if rem != 0.0 && ((rem < 0.0) != (b < 0.0)) {
                Ok(Number::Float(rem + b))
            } else {
                Ok(Number::Float(rem))
            }
        }
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, EvalError> {
    if let (Number::Int(b), Number::Int(e)) = (base, exponent) {
        if e >= 0 {
            let e = u32::try_from(e).map_err(|_| EvalError::Overflow)?;
            return b.checked_pow(e).map(Number::Int).ok_or(EvalError::Overflow);
        }
    }
    let (b, e) = (base.as_f64(), exponent.as_f64());
    if b == 0.0 && e < 0.0 {
        return Err(EvalError::ZeroNegativePower);
    }
    if b < 0.0 && e.fract() != 0.0 {
        return Err(EvalError::Domain);
    }
    Ok(Number::Float(b.powf(e)))
}

fn neg(value: Number) -> Result<Number, EvalError> {
    match value {
        Number::Int(value) => value
            .checked_neg()
            .map(Number::Int)
            .ok_or(EvalError::Overflow),
        Number::Float(value) => Ok(Number::Float(-value)),
    }
}

#[cfg(test)]
#[path = "tests/calculator_tests.rs"]
mod tests;
