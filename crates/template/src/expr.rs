//! Expression language used in template leaves.
//!
//! Expressions are compiled once into a small typed AST and evaluated against
//! a [`Scope`] holding the current record and its enclosing record. There is
//! no name resolution beyond `record`, `parent` and the whitelisted functions
//! in [`Func`], and no evaluation step can perform I/O.
//!
//! ```text
//! expr     := or_expr [ "if" or_expr "else" expr ]
//! or_expr  := cmp ( "or" cmp )*
//! cmp      := primary [ ("==" | "!=") primary ]
//! primary  := literal | path | call | "(" expr ")"
//! path     := ("record" | "parent") ( "." ident | "[" int "]" | "[" string "]" )*
//! call     := fn "(" [ expr ( "," expr )* ] ")"
//! ```

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::RoundingStrategy;
use serde_json::{Number, Value};
use shelfsync_core::value::{display_text, is_truthy, to_decimal, type_name};

use crate::error::{Error, Result};

/// Names an expression may read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    /// The record the (sub-)template is applied to.
    Record,
    /// The enclosing record; `null` at header level.
    Parent,
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// Whitelisted pure functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Str,
    Int,
    Float,
    Num,
    Min,
    Max,
    Len,
    Round,
    Lower,
    Upper,
    Trim,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "str" => Self::Str,
            "int" => Self::Int,
            "float" => Self::Float,
            "num" => Self::Num,
            "min" => Self::Min,
            "max" => Self::Max,
            "len" => Self::Len,
            "round" => Self::Round,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "trim" => Self::Trim,
            _ => return None,
        };
        Some(func)
    }

    /// Function name as written in templates.
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Num => "num",
            Self::Min => "min",
            Self::Max => "max",
            Self::Len => "len",
            Self::Round => "round",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Trim => "trim",
        }
    }

    fn accepts(self, count: usize) -> bool {
        match self {
            Self::Round => (1..=2).contains(&count),
            Self::Min | Self::Max => count >= 1,
            _ => count == 1,
        }
    }
}

/// Equality operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path {
        root: Root,
        segments: Vec<Segment>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
    /// First truthy operand, else the last one.
    Or(Vec<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        value: Box<Expr>,
        condition: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

static NULL: Value = Value::Null;

/// Values an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub record: &'a Value,
    pub parent: &'a Value,
}

impl<'a> Scope<'a> {
    /// Scope for a header-level leaf: no enclosing record.
    pub fn root(record: &'a Value) -> Self {
        Self {
            record,
            parent: &NULL,
        }
    }

    /// Scope for a leaf nested under `parent` (a variant of a record).
    pub fn nested(record: &'a Value, parent: &'a Value) -> Self {
        Self { record, parent }
    }
}

/// Parse failure with the character offset inside the expression source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub reason: String,
}

impl ParseError {
    fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

/// A compiled expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Compile an expression.
    pub fn parse(source: &str) -> std::result::Result<Self, ParseError> {
        let tokens = lex(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.parse_expr()?;
        if *parser.peek() != Tok::End {
            return Err(parser.error(format!("unexpected {}", parser.peek().describe())));
        }
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    /// Source text of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled AST.
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate against a scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Eval`] when a function cannot coerce its argument.
    /// Missing fields are not errors; they read as `null`.
    pub fn evaluate(&self, scope: Scope<'_>) -> Result<Value> {
        eval(&self.ast, scope).map_err(|reason| Error::eval(&self.source, reason))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(Value),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    End,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Dot => "'.'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
            Self::EqEq => "'=='".to_string(),
            Self::NotEq => "'!='".to_string(),
            Self::End => "end of expression".to_string(),
        }
    }
}

fn lex(source: &str) -> std::result::Result<Vec<(Tok, usize)>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        let start = i;
        let tok = match c {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '.' => {
                i += 1;
                Tok::Dot
            }
            '[' => {
                i += 1;
                Tok::LBracket
            }
            ']' => {
                i += 1;
                Tok::RBracket
            }
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            ',' => {
                i += 1;
                Tok::Comma
            }
            '=' | '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(ParseError::new(
                        start,
                        format!("unexpected '{c}'; comparisons are written '==' or '!='"),
                    ));
                }
                i += 2;
                if c == '=' {
                    Tok::EqEq
                } else {
                    Tok::NotEq
                }
            }
            '"' => {
                let (text, next) = lex_string(&chars, i)?;
                i = next;
                Tok::Str(text)
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let (number, next) = lex_number(&chars, i)?;
                i = next;
                Tok::Number(number)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.get(i) {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        i += 1;
                    } else {
                        break;
                    }
                }
                Tok::Ident(name)
            }
            other => {
                return Err(ParseError::new(
                    start,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        tokens.push((tok, start));
    }

    tokens.push((Tok::End, chars.len()));
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> std::result::Result<(String, usize), ParseError> {
    let mut text = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(ParseError::new(start, "unterminated string")),
            Some('"') => return Ok((text, i + 1)),
            Some('\\') => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| ParseError::new(start, "unterminated string"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            Some(c) => {
                text.push(*c);
                i += 1;
            }
        }
    }
}

fn lex_number(chars: &[char], start: usize) -> std::result::Result<(Value, usize), ParseError> {
    let mut text = String::new();
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        let after_exponent = matches!(text.chars().last(), Some('e' | 'E'));
        if c.is_ascii_digit()
            || matches!(c, '.' | 'e' | 'E')
            || (c == '-' && (i == start || after_exponent))
            || (c == '+' && after_exponent)
        {
            text.push(c);
            i += 1;
        } else {
            break;
        }
    }

    let value = if let Ok(int) = text.parse::<i64>() {
        Value::from(int)
    } else {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| ParseError::new(start, format!("invalid number '{text}'")))?
    };
    Ok((value, i))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::End, |(tok, _)| tok)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(_, offset)| *offset)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.offset(), reason)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name == keyword)
    }

    fn expect(&mut self, expected: &Tok) -> ParseResult<()> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                expected.describe(),
                self.peek().describe()
            )))
        }
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let value = self.parse_or()?;
        if !self.at_keyword("if") {
            return Ok(value);
        }
        self.advance();
        let condition = self.parse_or()?;
        if !self.at_keyword("else") {
            return Err(self.error("expected 'else' after condition"));
        }
        self.advance();
        let otherwise = self.parse_expr()?;
        Ok(Expr::Conditional {
            value: Box::new(value),
            condition: Box::new(condition),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut operands = vec![self.parse_cmp()?];
        while self.at_keyword("or") {
            self.advance();
            operands.push(self.parse_cmp()?);
        }
        if operands.len() == 1 {
            Ok(operands.remove(0))
        } else {
            Ok(Expr::Or(operands))
        }
    }

    fn parse_cmp(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Tok::EqEq => CmpOp::Eq,
            Tok::NotEq => CmpOp::Ne,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_primary()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Literal(n)),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Tok::Ident(name) => self.parse_name(name, offset),
            Tok::End => Err(ParseError::new(offset, "unexpected end of expression")),
            other => Err(ParseError::new(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn parse_name(&mut self, name: String, offset: usize) -> ParseResult<Expr> {
        match name.as_str() {
            "true" => Ok(Expr::Literal(Value::Bool(true))),
            "false" => Ok(Expr::Literal(Value::Bool(false))),
            "null" => Ok(Expr::Literal(Value::Null)),
            "record" => self.parse_path(Root::Record),
            "parent" => self.parse_path(Root::Parent),
            "or" | "if" | "else" => Err(ParseError::new(
                offset,
                format!("unexpected keyword '{name}'"),
            )),
            _ if *self.peek() == Tok::LParen => {
                let func = Func::from_name(&name)
                    .ok_or_else(|| ParseError::new(offset, format!("unknown function '{name}'")))?;
                self.advance();
                let args = self.parse_args()?;
                if !func.accepts(args.len()) {
                    return Err(ParseError::new(
                        offset,
                        format!("{}() does not take {} argument(s)", func.name(), args.len()),
                    ));
                }
                Ok(Expr::Call { func, args })
            }
            _ => Err(ParseError::new(
                offset,
                format!("unknown name '{name}'; expressions can only read 'record' and 'parent'"),
            )),
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if *self.peek() == Tok::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.advance() {
                Tok::Comma => continue,
                Tok::RParen => return Ok(args),
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')' in argument list, found {}",
                        other.describe()
                    )))
                }
            }
        }
    }

    fn parse_path(&mut self, root: Root) -> ParseResult<Expr> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    match self.advance() {
                        Tok::Ident(field) => segments.push(Segment::Field(field)),
                        other => {
                            return Err(self.error(format!(
                                "expected field name after '.', found {}",
                                other.describe()
                            )))
                        }
                    }
                }
                Tok::LBracket => {
                    self.advance();
                    let segment = match self.advance() {
                        Tok::Number(n) => n
                            .as_u64()
                            .and_then(|index| usize::try_from(index).ok())
                            .map(Segment::Index)
                            .ok_or_else(|| self.error("list index must be a non-negative integer"))?,
                        Tok::Str(field) => Segment::Field(field),
                        other => {
                            return Err(self.error(format!(
                                "expected index or quoted field name, found {}",
                                other.describe()
                            )))
                        }
                    };
                    self.expect(&Tok::RBracket)?;
                    segments.push(segment);
                }
                _ => return Ok(Expr::Path { root, segments }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

type EvalResult = std::result::Result<Value, String>;

fn eval(expr: &Expr, scope: Scope<'_>) -> EvalResult {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path { root, segments } => {
            let base = match root {
                Root::Record => scope.record,
                Root::Parent => scope.parent,
            };
            Ok(resolve(base, segments))
        }
        Expr::Or(operands) => {
            let mut last = Value::Null;
            for operand in operands {
                let value = eval(operand, scope)?;
                if is_truthy(&value) {
                    return Ok(value);
                }
                last = value;
            }
            Ok(last)
        }
        Expr::Compare { op, lhs, rhs } => {
            let equal = loosely_equal(&eval(lhs, scope)?, &eval(rhs, scope)?);
            Ok(Value::Bool(match op {
                CmpOp::Eq => equal,
                CmpOp::Ne => !equal,
            }))
        }
        Expr::Conditional {
            value,
            condition,
            otherwise,
        } => {
            if is_truthy(&eval(condition, scope)?) {
                eval(value, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Call { func, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            call(*func, &values)
        }
    }
}

fn resolve(base: &Value, segments: &[Segment]) -> Value {
    let mut current = base;
    for segment in segments {
        let next = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name),
            (Segment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn call(func: Func, args: &[Value]) -> EvalResult {
    let first = args.first().unwrap_or(&Value::Null);
    match func {
        Func::Str => Ok(Value::String(display_text(first))),
        Func::Int => to_int(first).map(Value::from),
        Func::Float => to_float(first).and_then(float_value),
        Func::Num => to_number(first),
        Func::Len => length(first).map(Value::from),
        Func::Round => {
            let digits = match args.get(1) {
                None => 0,
                Some(value) => value
                    .as_u64()
                    .filter(|digits| *digits <= 12)
                    .and_then(|digits| u32::try_from(digits).ok())
                    .ok_or_else(|| {
                        format!("round() digits must be an integer from 0 to 12, got {value}")
                    })?,
            };
            round(first, digits)
        }
        Func::Min => extreme(args, false),
        Func::Max => extreme(args, true),
        Func::Lower => map_text(first, |s| s.to_lowercase()),
        Func::Upper => map_text(first, |s| s.to_uppercase()),
        Func::Trim => map_text(first, |s| s.trim().to_string()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < 9.0e18 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn to_int(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate))
            .ok_or_else(|| format!("number {n} is out of int range")),
        Value::String(s) => {
            let text = s.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(truncate))
                .ok_or_else(|| format!("cannot convert string '{s}' to int"))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("cannot convert {} to int", type_name(other))),
    }
}

fn to_float(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number {n} is not representable as float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("cannot convert string '{s}' to float")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("cannot convert {} to float", type_name(other))),
    }
}

fn float_value(f: f64) -> EvalResult {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{f} is not a finite number"))
}

fn to_number(value: &Value) -> EvalResult {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let text = s.trim();
            match text.parse::<i64>() {
                Ok(int) => Ok(Value::from(int)),
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| format!("cannot convert string '{s}' to a number"))
                    .and_then(float_value),
            }
        }
        other => Err(format!("cannot convert {} to a number", type_name(other))),
    }
}

fn length(value: &Value) -> std::result::Result<usize, String> {
    match value {
        Value::String(s) => Ok(s.chars().count()),
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        other => Err(format!("len() is not defined for {}", type_name(other))),
    }
}

fn round(value: &Value, digits: u32) -> EvalResult {
    let decimal =
        to_decimal(value).ok_or_else(|| format!("cannot round {}", type_name(value)))?;
    let rounded = decimal.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
    if digits == 0 {
        rounded
            .to_i64()
            .map(Value::from)
            .ok_or_else(|| format!("{rounded} is out of int range"))
    } else {
        rounded
            .to_f64()
            .ok_or_else(|| format!("{rounded} is not representable as float"))
            .and_then(float_value)
    }
}

fn extreme(args: &[Value], want_max: bool) -> EvalResult {
    let candidates: Vec<&Value> = match args {
        [Value::Array(items)] => items.iter().collect(),
        _ => args.iter().collect(),
    };

    let mut best: Option<(&Value, f64)> = None;
    for candidate in candidates {
        let number = candidate
            .as_f64()
            .ok_or_else(|| format!("min/max expect numbers, got {}", type_name(candidate)))?;
        let replace = match best {
            None => true,
            Some((_, current)) if want_max => number > current,
            Some((_, current)) => number < current,
        };
        if replace {
            best = Some((candidate, number));
        }
    }

    best.map(|(value, _)| value.clone())
        .ok_or_else(|| "min/max need at least one number".to_string())
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> EvalResult {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(_) | Value::Object(_) => Err(format!(
            "text functions are not defined for {}",
            type_name(value)
        )),
        scalar => Ok(Value::String(f(&display_text(scalar)))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn run(source: &str, record: &Value) -> Result<Value> {
        let expression = Expression::parse(source).map_err(|e| Error::eval(source, e.reason))?;
        expression.evaluate(Scope::root(record))
    }

    #[test]
    fn test_field_paths() {
        let record = json!({"name": "Riafol", "variants": [{"sku": "A-1"}]});
        assert_eq!(run("record.name", &record).unwrap(), json!("Riafol"));
        assert_eq!(run("record.variants[0].sku", &record).unwrap(), json!("A-1"));
        assert_eq!(run("record[\"name\"]", &record).unwrap(), json!("Riafol"));
    }

    #[test]
    fn test_missing_fields_read_as_null() {
        let record = json!({"name": "Riafol"});
        assert_eq!(run("record.vendor", &record).unwrap(), Value::Null);
        assert_eq!(run("record.name.first", &record).unwrap(), Value::Null);
        assert_eq!(run("record.variants[3]", &record).unwrap(), Value::Null);
        assert_eq!(run("parent.id", &record).unwrap(), Value::Null);
    }

    #[test]
    fn test_or_falls_back_to_first_truthy() {
        let record = json!({"item_name": "", "name": "Fallback", "sku": null, "id": "Z1"});
        assert_eq!(
            run("record.item_name or record.name", &record).unwrap(),
            json!("Fallback")
        );
        assert_eq!(run("record.sku or record.id", &record).unwrap(), json!("Z1"));
        assert_eq!(run("record.sku or \"\"", &record).unwrap(), json!(""));
    }

    #[test]
    fn test_conditional_status_mapping() {
        let source = r#""active" if record.status == "active" else "draft""#;
        assert_eq!(
            run(source, &json!({"status": "active"})).unwrap(),
            json!("active")
        );
        assert_eq!(
            run(source, &json!({"status": "inactive"})).unwrap(),
            json!("draft")
        );
    }

    #[test]
    fn test_number_comparison_is_numeric() {
        let record = json!({"qty": 10.0});
        assert_eq!(run("record.qty == 10", &record).unwrap(), json!(true));
        assert_eq!(run("record.qty != 10", &record).unwrap(), json!(false));
    }

    #[test]
    fn test_coercions() {
        let record = json!({"rate": 218, "stock": "12", "price": 10.5, "label": "  Mixed Case "});
        assert_eq!(run("str(record.rate)", &record).unwrap(), json!("218"));
        assert_eq!(run("str(record.price)", &record).unwrap(), json!("10.5"));
        assert_eq!(run("str(record.missing)", &record).unwrap(), json!(""));
        assert_eq!(run("int(record.stock)", &record).unwrap(), json!(12));
        assert_eq!(run("int(record.price)", &record).unwrap(), json!(10));
        assert_eq!(run("float(record.stock)", &record).unwrap(), json!(12.0));
        assert_eq!(run("num(record.stock)", &record).unwrap(), json!(12));
        assert_eq!(run("lower(trim(record.label))", &record).unwrap(), json!("mixed case"));
        assert_eq!(run("upper(record.missing)", &record).unwrap(), Value::Null);
    }

    #[test]
    fn test_round_is_half_away_from_zero() {
        let record = json!({"a": 2.675, "b": "2.5", "c": -2.5});
        assert_eq!(run("round(record.a, 2)", &record).unwrap(), json!(2.68));
        assert_eq!(run("round(record.b)", &record).unwrap(), json!(3));
        assert_eq!(run("round(record.c)", &record).unwrap(), json!(-3));
    }

    #[test]
    fn test_min_max_len() {
        let record = json!({"levels": [4, 9, 2], "name": "abc"});
        assert_eq!(run("max(record.levels)", &record).unwrap(), json!(9));
        assert_eq!(run("min(record.levels)", &record).unwrap(), json!(2));
        assert_eq!(run("min(5, 3.5)", &record).unwrap(), json!(3.5));
        assert_eq!(run("len(record.levels)", &record).unwrap(), json!(3));
        assert_eq!(run("len(record.name)", &record).unwrap(), json!(3));
    }

    #[test]
    fn test_eval_errors() {
        let record = json!({"stock": "n/a", "flag": true});
        assert!(matches!(
            run("int(record.stock)", &record),
            Err(Error::Eval { .. })
        ));
        assert!(run("int(record.missing)", &record).is_err());
        assert!(run("len(record.flag)", &record).is_err());
        assert!(run("max(record.stock)", &record).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        let err = Expression::parse("item.name").unwrap_err();
        assert!(err.reason.contains("unknown name 'item'"));
        assert_eq!(err.offset, 0);

        let err = Expression::parse("record.a or open(\"x\")").unwrap_err();
        assert!(err.reason.contains("unknown function 'open'"));
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn test_parse_rejects_bad_arity_and_trailing_tokens() {
        assert!(Expression::parse("str(record.a, record.b)").is_err());
        assert!(Expression::parse("record.a record.b").is_err());
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("record.a = 1").is_err());
        assert!(Expression::parse("\"open").is_err());
        assert!(Expression::parse("\"a\" if record.b").is_err());
    }
}
