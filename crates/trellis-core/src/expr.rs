//! Restricted expression language used by template interpolation and
//! `:`-prefixed props.
//!
//! The grammar covers what templates need: literals, property paths,
//! indexing, optional chaining, calls to a fixed set of string, array,
//! number and `Math` methods, unary and binary operators, `&&`/`||`/`??`
//! and the ternary operator. Everything is evaluated against an explicit
//! [`Scope`]; nothing outside it is reachable.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::error::EvalError;
use crate::value::{Value, ValueMap};

const PARSE_CACHE_LIMIT: usize = 512;

thread_local! {
    static PARSED: RefCell<HashMap<String, Rc<Expr>>> = RefCell::new(HashMap::new());
}

/// Flat evaluation scope.
///
/// Layers are applied in order and later keys overwrite earlier ones, so
/// a module layered after state shadows a same-named state key.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: ValueMap,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// State first, then modules.
    pub fn merged(state: &ValueMap, modules: &ValueMap) -> Self {
        let mut scope = Self::new();
        scope.layer(state);
        scope.layer(modules);
        scope
    }

    pub fn layer(&mut self, values: &ValueMap) -> &mut Self {
        for (key, value) in values {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Evaluates `source` against `scope`, never failing.
///
/// Any fault is logged and turned into [`Value::Undefined`].
pub fn evaluate(source: &str, scope: &Scope) -> Value {
    match try_evaluate(source, scope) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("expression `{source}` failed: {err}");
            Value::Undefined
        }
    }
}

pub fn try_evaluate(source: &str, scope: &Scope) -> Result<Value, EvalError> {
    let expr = parse_cached(source)?;
    Ok(Interpreter { scope }.eval(&expr)?.unwrap_or_default())
}

fn parse_cached(source: &str) -> Result<Rc<Expr>, EvalError> {
    if let Some(expr) = PARSED.with(|cache| cache.borrow().get(source).cloned()) {
        return Ok(expr);
    }
    let expr = Rc::new(parse(source)?);
    PARSED.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.len() >= PARSE_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(source.to_owned(), Rc::clone(&expr));
    });
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Punct(p) => format!("'{p}'"),
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "<", ">", "+", "-", "*", "/",
    "%", "!", "?", ":", ".", ",", "(", ")", "[", "]",
];

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, EvalError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &source[start..pos];
            let number = text
                .parse()
                .map_err(|_| EvalError::UnexpectedChar { ch: '.', offset: start })?;
            tokens.push((Token::Number(number), start));
            continue;
        }

        if c == b'"' || c == b'\'' {
            let start = pos;
            pos += 1;
            let mut text = String::new();
            loop {
                let Some(ch) = source[pos..].chars().next() else {
                    return Err(EvalError::UnterminatedString { offset: start });
                };
                pos += ch.len_utf8();
                if ch as u32 == u32::from(c) {
                    break;
                }
                if ch == '\\' {
                    let Some(escaped) = source[pos..].chars().next() else {
                        return Err(EvalError::UnterminatedString { offset: start });
                    };
                    pos += escaped.len_utf8();
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                } else {
                    text.push(ch);
                }
            }
            tokens.push((Token::Str(text), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let start = pos;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
            {
                pos += 1;
            }
            tokens.push((Token::Ident(source[start..pos].to_owned()), start));
            continue;
        }

        let rest = &source[pos..];
        let punct = PUNCTUATORS.iter().copied().find(|p| {
            // `a?.5:1` is a ternary, not optional chaining.
            rest.starts_with(p)
                && !(*p == "?." && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit))
        });
        match punct {
            Some(p) => {
                tokens.push((Token::Punct(p), pos));
                pos += p.len();
            }
            None => {
                let ch = rest.chars().next().unwrap_or('\0');
                return Err(EvalError::UnexpectedChar { ch, offset: pos });
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    And,
    Or,
    Coalesce,
}

impl BinaryOp {
    fn from_punct(p: &str) -> Option<(Self, u8)> {
        let op = match p {
            "??" => (BinaryOp::Coalesce, 1),
            "||" => (BinaryOp::Or, 2),
            "&&" => (BinaryOp::And, 3),
            "==" => (BinaryOp::Eq, 4),
            "!=" => (BinaryOp::Ne, 4),
            "===" => (BinaryOp::StrictEq, 4),
            "!==" => (BinaryOp::StrictNe, 4),
            "<" => (BinaryOp::Lt, 5),
            "<=" => (BinaryOp::Le, 5),
            ">" => (BinaryOp::Gt, 5),
            ">=" => (BinaryOp::Ge, 5),
            "+" => (BinaryOp::Add, 6),
            "-" => (BinaryOp::Sub, 6),
            "*" => (BinaryOp::Mul, 7),
            "/" => (BinaryOp::Div, 7),
            "%" => (BinaryOp::Rem, 7),
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

fn parse(source: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.conditional()?;
    if let Some((token, offset)) = parser.tokens.get(parser.pos) {
        return Err(EvalError::UnexpectedToken {
            found: token.describe(),
            expected: "end of expression",
            offset: *offset,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_punct(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn next(&mut self) -> Result<(Token, usize), EvalError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(EvalError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.peek_punct() == Some(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &'static str) -> Result<(), EvalError> {
        let (token, offset) = self.next()?;
        if token == Token::Punct(punct) {
            Ok(())
        } else {
            Err(EvalError::UnexpectedToken {
                found: token.describe(),
                expected: punct,
                offset,
            })
        }
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        let test = self.binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.conditional()?;
        self.expect(":")?;
        let alternate = self.conditional()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        while let Some((op, bp)) = self.peek_punct().and_then(BinaryOp::from_punct) {
            if bp <= min_bp {
                break;
            }
            self.pos += 1;
            let right = self.binary(bp)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek_punct() {
            Some("!") => UnaryOp::Not,
            Some("-") => UnaryOp::Neg,
            Some("+") => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        loop {
            let optional = match self.peek_punct() {
                Some(".") => false,
                Some("?.") => true,
                Some("[") => {
                    self.pos += 1;
                    let index = self.conditional()?;
                    self.expect("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    };
                    continue;
                }
                _ => break,
            };
            self.pos += 1;

            if optional && self.eat("[") {
                let index = self.conditional()?;
                self.expect("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: true,
                };
                continue;
            }

            let (token, offset) = self.next()?;
            let Token::Ident(property) = token else {
                return Err(EvalError::UnexpectedToken {
                    found: token.describe(),
                    expected: "property name",
                    offset,
                });
            };

            if self.eat("(") {
                let args = self.arguments(")")?;
                expr = Expr::Call {
                    object: Box::new(expr),
                    method: property,
                    args,
                    optional,
                };
            } else {
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional,
                };
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self, close: &'static str) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.eat(close) {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let (token, offset) = self.next()?;
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let inner = self.conditional()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.arguments("]")?)),
            other => Err(EvalError::UnexpectedToken {
                found: other.describe(),
                expected: "a value",
                offset,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

struct Interpreter<'a> {
    scope: &'a Scope,
}

/// `None` marks a chain short-circuited by `?.`.
type Chain = Option<Value>;

impl Interpreter<'_> {
    fn eval(&self, expr: &Expr) -> Result<Chain, EvalError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(receiver) = self.eval(object)? else {
                    return Ok(None);
                };
                if *optional && receiver.is_nullish() {
                    return Ok(None);
                }
                read_property(&receiver, property).map(Some)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(receiver) = self.eval(object)? else {
                    return Ok(None);
                };
                if *optional && receiver.is_nullish() {
                    return Ok(None);
                }
                let index = self.value(index)?;
                read_index(&receiver, &index).map(Some)
            }
            Expr::Call {
                object,
                method,
                args,
                optional,
            } => {
                if let Expr::Ident(name) = object.as_ref() {
                    if name == "Math" && self.scope.get("Math").is_none() {
                        let args = self.values(args)?;
                        return call_math(method, &args).map(Some);
                    }
                }
                let Some(receiver) = self.eval(object)? else {
                    return Ok(None);
                };
                if *optional && receiver.is_nullish() {
                    return Ok(None);
                }
                let args = self.values(args)?;
                call_method(&receiver, method, &args).map(Some)
            }
            other => self.plain(other).map(Some),
        }
    }

    fn value(&self, expr: &Expr) -> Result<Value, EvalError> {
        Ok(self.eval(expr)?.unwrap_or_default())
    }

    fn values(&self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|expr| self.value(expr)).collect()
    }

    fn plain(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => Ok(Value::Array(self.values(items)?)),
            Expr::Ident(name) => Ok(self.scope.get(name).cloned().unwrap_or_default()),
            Expr::Unary { op, operand } => {
                let value = self.value(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.value(left)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => return Ok(left),
                    BinaryOp::Or if left.is_truthy() => return Ok(left),
                    BinaryOp::Coalesce if !left.is_nullish() => return Ok(left),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => {
                        return self.value(right)
                    }
                    _ => {}
                }
                let right = self.value(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.value(test)?.is_truthy() {
                    self.value(consequent)
                } else {
                    self.value(alternate)
                }
            }
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => self.value(expr),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(_), _)
            | (_, Value::String(_))
            | (Value::Array(_) | Value::Object(_), _)
            | (_, Value::Array(_) | Value::Object(_)) => {
                Value::String(format!("{left}{right}"))
            }
            _ => Value::Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_eq(right)),
        BinaryOp::And => (if left.is_truthy() { right } else { left }).clone(),
        BinaryOp::Or => (if left.is_truthy() { left } else { right }).clone(),
        BinaryOp::Coalesce => (if left.is_nullish() { right } else { left }).clone(),
    }
}

fn read_property(receiver: &Value, property: &str) -> Result<Value, EvalError> {
    match receiver {
        Value::Undefined | Value::Null => Err(EvalError::PropertyOfNothing {
            property: property.to_owned(),
            receiver: receiver.type_name(),
        }),
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or_default()),
        Value::Array(items) if property == "length" => Ok(Value::from(items.len())),
        Value::String(s) if property == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Undefined),
    }
}

fn read_index(receiver: &Value, index: &Value) -> Result<Value, EvalError> {
    match (receiver, index) {
        (Value::Undefined | Value::Null, _) => Err(EvalError::PropertyOfNothing {
            property: index.to_string(),
            receiver: receiver.type_name(),
        }),
        (Value::Array(items), Value::Number(n)) => Ok(as_index(*n)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default()),
        (Value::String(s), Value::Number(n)) => Ok(as_index(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default()),
        (_, key) => read_property(receiver, &key.to_string()),
    }
}

fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Resolves a possibly negative slice bound against `len`.
fn slice_bound(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Undefined => default,
        other => {
            let n = other.to_number();
            if n.is_nan() {
                0
            } else if n < 0.0 {
                len.saturating_sub((-n) as usize)
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Undefined | Value::Null => Err(EvalError::PropertyOfNothing {
            property: method.to_owned(),
            receiver: receiver.type_name(),
        }),
        Value::String(s) => string_method(s, method, args),
        Value::Array(items) => array_method(items, method, args),
        Value::Number(n) => number_method(*n, method, args),
        other => Err(EvalError::NotCallable {
            receiver: other.type_name(),
            method: method.to_owned(),
        }),
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let needle = || arg(args, 0).to_display();
    let value = match method {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_owned()),
        "toString" => Value::String(s.to_owned()),
        "includes" => Value::Bool(s.contains(needle().as_str())),
        "startsWith" => Value::Bool(s.starts_with(needle().as_str())),
        "endsWith" => Value::Bool(s.ends_with(needle().as_str())),
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = slice_bound(&arg(args, 0), chars.len(), 0);
            let end = slice_bound(&arg(args, 1), chars.len(), chars.len());
            Value::String(chars.get(start..end.max(start)).unwrap_or_default().iter().collect())
        }
        "split" => {
            let separator = needle();
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::from).collect()
            };
            Value::Array(parts)
        }
        "replace" => {
            let pattern = needle();
            let replacement = arg(args, 1).to_display();
            Value::String(s.replacen(pattern.as_str(), &replacement, 1))
        }
        _ => {
            return Err(EvalError::NotCallable {
                receiver: "string",
                method: method.to_owned(),
            })
        }
    };
    Ok(value)
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let value = match method {
        "includes" => Value::Bool(items.contains(&arg(args, 0))),
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|item| item.strict_eq(&needle))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_owned(),
                other => other.to_display(),
            };
            Value::String(
                items
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "slice" => {
            let start = slice_bound(&arg(args, 0), items.len(), 0);
            let end = slice_bound(&arg(args, 1), items.len(), items.len());
            Value::Array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "concat" => {
            let mut joined = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other.clone()),
                }
            }
            Value::Array(joined)
        }
        _ => {
            return Err(EvalError::NotCallable {
                receiver: "array",
                method: method.to_owned(),
            })
        }
    };
    Ok(value)
}

fn number_method(n: f64, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    match method {
        "toString" => Ok(Value::String(Value::Number(n).to_string())),
        "toFixed" => {
            let digits = match arg(args, 0) {
                Value::Undefined => 0.0,
                other => other.to_number(),
            };
            if !(0.0..=20.0).contains(&digits) {
                return Err(EvalError::InvalidArguments {
                    method: "toFixed".to_owned(),
                    details: format!("digits {digits} out of range"),
                });
            }
            Ok(Value::String(format!("{n:.*}", digits as usize)))
        }
        _ => Err(EvalError::NotCallable {
            receiver: "number",
            method: method.to_owned(),
        }),
    }
}

fn call_math(method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let x = || arg(args, 0).to_number();
    let value = match method {
        "floor" => x().floor(),
        "ceil" => x().ceil(),
        "round" => (x() + 0.5).floor(),
        "abs" => x().abs(),
        "max" => args
            .iter()
            .map(Value::to_number)
            .fold(f64::NEG_INFINITY, f64::max),
        "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min),
        _ => {
            return Err(EvalError::NotCallable {
                receiver: "Math",
                method: method.to_owned(),
            })
        }
    };
    Ok(Value::Number(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_map;

    fn scope() -> Scope {
        let state = value_map! {
            "count" => 2,
            "name" => "Ada",
            "items" => vec!["a", "b", "c"],
            "user" => Value::Object(value_map! {
                "profile" => Value::Object(value_map! { "city" => "Oslo" }),
            }),
        };
        Scope::merged(&state, &value_map! {})
    }

    fn eval(src: &str) -> Value {
        try_evaluate(src, &scope()).expect("expression evaluates")
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval("1 + count * 3"), Value::from(7));
        assert_eq!(eval("(1 + count) * 3"), Value::from(9));
        assert_eq!(eval("-count + 10 % 4"), Value::from(0));
    }

    #[test]
    fn string_concatenation_and_methods() {
        assert_eq!(eval("'Hi ' + name.toUpperCase()"), Value::from("Hi ADA"));
        assert_eq!(eval("name.length"), Value::from(3));
        assert_eq!(eval("items.join('-')"), Value::from("a-b-c"));
        assert_eq!(eval("items[1]"), Value::from("b"));
        assert_eq!(eval("items.slice(-2).length"), Value::from(2));
    }

    #[test]
    fn property_paths_and_optional_chaining() {
        assert_eq!(eval("user.profile.city"), Value::from("Oslo"));
        assert_eq!(eval("user.missing?.city"), Value::Undefined);
        assert_eq!(eval("user?.missing?.deep.deeper"), Value::Undefined);
        assert_eq!(eval("user['profile'].city"), Value::from("Oslo"));
    }

    #[test]
    fn member_of_undefined_is_a_fault() {
        let err = try_evaluate("foo.bar.baz", &scope()).unwrap_err();
        assert!(matches!(err, EvalError::PropertyOfNothing { .. }));
        assert_eq!(evaluate("foo.bar.baz", &scope()), Value::Undefined);
    }

    #[test]
    fn logical_and_ternary() {
        assert_eq!(eval("count > 1 ? 'many' : 'one'"), Value::from("many"));
        assert_eq!(eval("missing || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("missing ?? 0"), Value::from(0));
        assert_eq!(eval("count && name"), Value::from("Ada"));
        assert_eq!(eval("!items.includes('z')"), Value::from(true));
        assert_eq!(eval("count === 2 && count == '2'"), Value::from(true));
    }

    #[test]
    fn ternary_with_decimal_branch_is_not_optional_chaining() {
        assert_eq!(eval("count?.5:1"), Value::from(0.5));
    }

    #[test]
    fn math_helpers() {
        assert_eq!(eval("Math.max(1, count, 5)"), Value::from(5));
        assert_eq!(eval("Math.floor(7 / count)"), Value::from(3));
        assert_eq!(eval("(10 / 3).toFixed(2)"), Value::from("3.33"));
    }

    #[test]
    fn later_layers_shadow_earlier_ones() {
        let state = value_map! { "cart" => "state-cart", "count" => 1 };
        let modules = value_map! { "cart" => Value::Object(value_map! { "total" => 9 }) };
        let scope = Scope::merged(&state, &modules);
        assert_eq!(try_evaluate("cart.total", &scope), Ok(Value::from(9)));
        assert_eq!(try_evaluate("count", &scope), Ok(Value::from(1)));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            try_evaluate("count +", &scope()),
            Err(EvalError::UnexpectedEnd)
        ));
        assert!(matches!(
            try_evaluate("count # 2", &scope()),
            Err(EvalError::UnexpectedChar { ch: '#', .. })
        ));
        assert!(matches!(
            try_evaluate("'open", &scope()),
            Err(EvalError::UnterminatedString { .. })
        ));
        assert!(matches!(
            try_evaluate("name.launch()", &scope()),
            Err(EvalError::NotCallable { .. })
        ));
    }
}
