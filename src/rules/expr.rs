//! Sandboxed pricing-expression language.
//!
//! Rule expressions are parsed once into an [`Expression`] tree and then
//! evaluated against a map of variable bindings. The language covers
//! decimal arithmetic, comparisons, boolean logic, a ternary operator and
//! a handful of numeric functions:
//!
//! ```text
//! expr       := or ( '?' expr ':' expr )?
//! or         := and ( '||' and )*
//! and        := equality ( '&&' equality )*
//! equality   := comparison ( ( '==' | '!=' ) comparison )*
//! comparison := additive ( ( '<' | '<=' | '>' | '>=' ) additive )*
//! additive   := term ( ( '+' | '-' ) term )*
//! term       := unary ( ( '*' | '/' | '%' ) unary )*
//! unary      := ( '-' | '!' ) unary | primary
//! primary    := NUMBER | STRING | 'true' | 'false' | IDENT
//!             | IDENT '(' [ expr ( ',' expr )* ] ')' | '(' expr ')'
//! ```
//!
//! Typing is strict: no implicit conversion between numbers, text and
//! booleans. All arithmetic is checked.
//!
//! ```
//! use std::collections::BTreeMap;
//! use rust_decimal_macros::dec;
//! use vatcost::rules::{Expression, Value};
//!
//! let expr = Expression::parse("transactionVolume > 100 ? basePrice * 1.5 : basePrice").unwrap();
//! let mut vars = BTreeMap::new();
//! vars.insert("transactionVolume".to_string(), Value::Number(dec!(250)));
//! vars.insert("basePrice".to_string(), Value::Number(dec!(200)));
//! assert_eq!(expr.evaluate(&vars).unwrap(), Value::Number(dec!(300.0)));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Longest accepted expression source, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest accepted nesting of sub-expressions.
pub const MAX_DEPTH: usize = 64;

/// A runtime value inside an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(Decimal),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("expression exceeds {MAX_EXPRESSION_LEN} bytes")]
    TooLong,

    #[error("expression nested deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(Value),
    Variable(String),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Ternary(Box<Expression>, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
}

impl FromStr for Expression {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Expression {
    /// Parse expression source into a tree.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        if source.len() > MAX_EXPRESSION_LEN {
            return Err(ExprError::TooLong);
        }
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            end: source.len(),
        };
        let expr = parser.expression()?;
        if let Some(tok) = parser.peek() {
            return Err(ExprError::Syntax {
                offset: tok.offset,
                message: format!("unexpected {}", tok.kind),
            });
        }
        Ok(expr)
    }

    /// Names of every variable the expression references.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Variable(name) => {
                out.insert(name.as_str());
            }
            Self::Unary(_, e) => e.collect_variables(out),
            Self::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Self::Ternary(c, t, e) => {
                c.collect_variables(out);
                t.collect_variables(out);
                e.collect_variables(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.collect_variables(out)),
        }
    }

    /// Evaluate against `vars`. Never mutates the bindings.
    pub fn evaluate(&self, vars: &BTreeMap<String, Value>) -> Result<Value, ExprError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Variable(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::UnboundVariable(name.clone())),
            Self::Unary(op, operand) => {
                let value = operand.evaluate(vars)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, v) => Err(ExprError::Type(format!(
                        "cannot negate {}",
                        v.type_name()
                    ))),
                    (UnaryOp::Not, v) => Err(ExprError::Type(format!(
                        "'!' needs bool, got {}",
                        v.type_name()
                    ))),
                }
            }
            Self::Binary(BinaryOp::And, l, r) => {
                if expect_bool(l.evaluate(vars)?, "&&")? {
                    Ok(Value::Bool(expect_bool(r.evaluate(vars)?, "&&")?))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            Self::Binary(BinaryOp::Or, l, r) => {
                if expect_bool(l.evaluate(vars)?, "||")? {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(expect_bool(r.evaluate(vars)?, "||")?))
                }
            }
            Self::Binary(op, l, r) => binary(*op, l.evaluate(vars)?, r.evaluate(vars)?),
            Self::Ternary(cond, then, otherwise) => {
                if expect_bool(cond.evaluate(vars)?, "?:")? {
                    then.evaluate(vars)
                } else {
                    otherwise.evaluate(vars)
                }
            }
            Self::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(vars))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, values)
            }
        }
    }

    /// Evaluate and require a numeric result.
    pub fn evaluate_number(&self, vars: &BTreeMap<String, Value>) -> Result<Decimal, ExprError> {
        match self.evaluate(vars)? {
            Value::Number(n) => Ok(n),
            other => Err(ExprError::Type(format!(
                "expression must produce a number, got {}",
                other.type_name()
            ))),
        }
    }
}

fn expect_bool(value: Value, op: &str) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Type(format!(
            "'{op}' needs bool, got {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        if lhs.type_name() != rhs.type_name() {
            return Err(ExprError::Type(format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
        let equal = lhs == rhs;
        return Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }));
    }

    let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
        return Err(ExprError::Type(format!(
            "'{}' needs numbers, got {} and {}",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )));
    };
    let (a, b) = (*a, *b);

    let n = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b.is_zero() => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::Lt => return Ok(Value::Bool(a < b)),
        BinaryOp::Le => return Ok(Value::Bool(a <= b)),
        BinaryOp::Gt => return Ok(Value::Bool(a > b)),
        BinaryOp::Ge => return Ok(Value::Bool(a >= b)),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => {
            return Err(ExprError::Type(format!(
                "'{}' is not an arithmetic operator",
                op.symbol()
            )));
        }
    };
    n.map(Value::Number).ok_or(ExprError::Overflow)
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    let numbers = args
        .iter()
        .map(|v| {
            v.as_number().ok_or_else(|| {
                ExprError::Type(format!("{name}() needs numbers, got {}", v.type_name()))
            })
        })
        .collect::<Result<Vec<_>, _>>();

    let arity = |expected: &'static str| ExprError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    };

    match name {
        "min" | "max" => {
            let numbers = numbers?;
            let picked = if name == "min" {
                numbers.iter().copied().min()
            } else {
                numbers.iter().copied().max()
            };
            picked.map(Value::Number).ok_or_else(|| arity("at least 1"))
        }
        "abs" | "floor" | "ceil" => {
            let numbers = numbers?;
            let [x] = numbers[..] else {
                return Err(arity("1"));
            };
            let n = match name {
                "abs" => x.abs(),
                "floor" => x.floor(),
                _ => x.ceil(),
            };
            Ok(Value::Number(n))
        }
        "round" => {
            let numbers = numbers?;
            let (x, dp) = match numbers[..] {
                [x] => (x, Decimal::ZERO),
                [x, dp] => (x, dp),
                _ => return Err(arity("1 or 2")),
            };
            if dp.is_sign_negative() || !dp.fract().is_zero() || dp > Decimal::from(28) {
                return Err(ExprError::Type(format!(
                    "round() precision must be an integer in 0..=28, got {dp}"
                )));
            }
            let dp = dp.to_u32().ok_or(ExprError::Overflow)?;
            Ok(Value::Number(x.round_dp_with_strategy(
                dp,
                RoundingStrategy::MidpointAwayFromZero,
            )))
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

// ── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Number(Decimal),
    Text(String),
    Ident(String),
    Symbol(&'static str),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Text(s) => write!(f, "string \"{s}\""),
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Symbol(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "(", ")", ",", "?", ":", "<",
    ">", "!",
];

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &source[start..i];
            let n = Decimal::from_str(text).map_err(|_| ExprError::Syntax {
                offset: start,
                message: format!("invalid number '{text}'"),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(n),
                offset: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..i].to_string()),
                offset: start,
            });
            continue;
        }

        if c == b'"' || c == b'\'' {
            let quote = c;
            i += 1;
            let body_start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(ExprError::Syntax {
                    offset: start,
                    message: "unterminated string".into(),
                });
            }
            tokens.push(Token {
                kind: TokenKind::Text(source[body_start..i].to_string()),
                offset: start,
            });
            i += 1;
            continue;
        }

        let rest = &source[i..];
        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(sym) => {
                tokens.push(Token {
                    kind: TokenKind::Symbol(sym),
                    offset: start,
                });
                i += sym.len();
            }
            None => {
                let ch = rest.chars().next().unwrap_or('?');
                return Err(ExprError::Syntax {
                    offset: start,
                    message: format!("unexpected character '{ch}'"),
                });
            }
        }
    }

    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_symbol(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Symbol(s),
                ..
            }) => Some(*s),
            _ => None,
        }
    }

    fn eat(&mut self, symbol: &str) -> bool {
        if self.peek_symbol() == Some(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: &str) -> Result<(), ExprError> {
        if self.eat(symbol) {
            return Ok(());
        }
        Err(self.error(format!("expected '{symbol}'")))
    }

    fn error(&self, message: String) -> ExprError {
        match self.peek() {
            Some(tok) => ExprError::Syntax {
                offset: tok.offset,
                message: format!("{message}, found {}", tok.kind),
            },
            None => ExprError::Syntax {
                offset: self.end,
                message: format!("{message}, found end of input"),
            },
        }
    }

    fn expression(&mut self) -> Result<Expression, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let cond = self.or()?;
        let expr = if self.eat("?") {
            let then = self.expression()?;
            self.expect(":")?;
            let otherwise = self.expression()?;
            Expression::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))
        } else {
            cond
        };
        self.depth -= 1;
        Ok(expr)
    }

    /// Parse a left-associative chain of `ops` over `next`.
    fn chain(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression, ExprError>,
    ) -> Result<Expression, ExprError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (sym, op) in ops {
                if self.eat(sym) {
                    let rhs = next(self)?;
                    lhs = Expression::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn or(&mut self) -> Result<Expression, ExprError> {
        self.chain(&[("||", BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expression, ExprError> {
        self.chain(&[("&&", BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expression, ExprError> {
        self.chain(
            &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expression, ExprError> {
        self.chain(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expression, ExprError> {
        self.chain(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expression, ExprError> {
        self.chain(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expression, ExprError> {
        let op = if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("!") {
            UnaryOp::Not
        } else {
            return self.primary();
        };
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expression::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expression, ExprError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error("expected a value".into()));
        };
        match tok.kind {
            TokenKind::Number(n) => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Number(n)))
            }
            TokenKind::Text(s) => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Text(s)))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => return Ok(Expression::Literal(Value::Bool(true))),
                    "false" => return Ok(Expression::Literal(Value::Bool(false))),
                    _ => {}
                }
                if !self.eat("(") {
                    return Ok(Expression::Variable(name));
                }
                let mut args = Vec::new();
                if !self.eat(")") {
                    loop {
                        args.push(self.expression()?);
                        if self.eat(")") {
                            break;
                        }
                        self.expect(",")?;
                    }
                }
                Ok(Expression::Call(name, args))
            }
            TokenKind::Symbol("(") => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            TokenKind::Symbol(_) => Err(self.error("expected a value".into())),
        }
    }
}
