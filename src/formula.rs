//! Level formulas
//!
//! Small arithmetic expressions over one free variable, `lv`, the index of
//! the generation being drawn. Used for the turning angle, tropism, figure
//! scale and the fixed camera centre.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),
    #[error("Unexpected end of formula")]
    UnexpectedEnd,
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("Function {0} expects {1} argument(s)")]
    Arity(String, usize),
    #[error("Trailing input at {0}")]
    Trailing(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Exp,
    Ln,
    Log,
    Sin,
    Cos,
    Tan,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "exp" => Func::Exp,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args[0];
        match self {
            Func::Sqrt => a.sqrt(),
            Func::Abs => a.abs(),
            Func::Floor => a.floor(),
            Func::Ceil => a.ceil(),
            Func::Round => a.round(),
            Func::Exp => a.exp(),
            Func::Ln => a.ln(),
            Func::Log => a.log10(),
            Func::Sin => a.sin(),
            Func::Cos => a.cos(),
            Func::Tan => a.tan(),
            Func::Min => a.min(args[1]),
            Func::Max => a.max(args[1]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Level,
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, level: f64) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Level => level,
            Expr::Neg(e) => -e.eval(level),
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(level), b.eval(level));
                match op {
                    '+' => a + b,
                    '-' => a - b,
                    '*' => a * b,
                    '/' => a / b,
                    _ => a.powf(b),
                }
            }
            Expr::Call(f, args) => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(level)).collect();
                f.apply(&values)
            }
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    /// Character at the cursor, whitespace included; used inside tokens
    fn raw(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Next character after skipping whitespace between tokens
    fn peek(&mut self) -> Option<char> {
        while matches!(self.raw(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.raw()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), FormulaError> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(FormulaError::UnexpectedChar(found, self.pos)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn parse(mut self) -> Result<Expr, FormulaError> {
        let expr = self.expr()?;
        if self.peek().is_some() {
            return Err(FormulaError::Trailing(self.pos));
        }
        Ok(expr)
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat('-') {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(Expr::Binary('^', Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            None => Err(FormulaError::UnexpectedEnd),
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(c) => Err(FormulaError::UnexpectedChar(c, self.pos)),
        }
    }

    fn number(&mut self) -> Result<Expr, FormulaError> {
        let start = self.pos;
        while matches!(self.raw(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if matches!(self.raw(), Some('e' | 'E'))
            && matches!(self.chars.get(self.pos + 1), Some(c) if c.is_ascii_digit() || *c == '-' || *c == '+')
        {
            self.pos += 2;
            while matches!(self.raw(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| FormulaError::UnexpectedChar(self.chars[start], start))
    }

    fn identifier(&mut self) -> Result<Expr, FormulaError> {
        let start = self.pos;
        while matches!(self.raw(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if self.eat('(') {
            let func = Func::from_name(&name).ok_or(FormulaError::UnknownFunction(name.clone()))?;
            let mut args = vec![self.expr()?];
            while self.eat(',') {
                args.push(self.expr()?);
            }
            self.expect(')')?;
            if args.len() != func.arity() {
                return Err(FormulaError::Arity(name, func.arity()));
            }
            return Ok(Expr::Call(func, args));
        }

        match name.as_str() {
            "lv" => Ok(Expr::Level),
            "pi" => Ok(Expr::Number(std::f64::consts::PI)),
            "e" => Ok(Expr::Number(std::f64::consts::E)),
            _ => Err(FormulaError::UnknownIdentifier(name)),
        }
    }
}

/// A parsed formula that remembers its source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let expr = Parser::new(source).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn constant(value: f64) -> Self {
        Self {
            source: value.to_string(),
            expr: Expr::Number(value),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, level: usize) -> f64 {
        self.expr.eval(level as f64)
    }
}

impl TryFrom<String> for Formula {
    type Error = FormulaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Formula::parse(&value)
    }
}

impl From<Formula> for String {
    fn from(value: Formula) -> Self {
        value.source
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
