//! Pratt parser and evaluator for the expression subset.

use caravan_core::error::EngineError;

use super::lexer::{Token, tokenize};
use super::{ExprValue, VarResolver};

/// Maximum accepted expression length in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Maximum parser recursion depth (parenthesis/operator nesting).
const MAX_DEPTH: u32 = 64;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(ExprValue),
    /// A `VAR(name [, default])` lookup.
    Var {
        /// Variable name.
        name: String,
        /// Fallback when the variable has never been set.
        default: Option<Box<Expr>>,
    },
    /// Unary negation or logical not.
    Unary(UnaryOp, Box<Expr>),
    /// A binary operation.
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+` (numeric add, or concat when either side is a string)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl BinOp {
    /// Left binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }

    fn from_token(token: &Token) -> Option<Self> {
        match token {
            Token::OrOr => Some(Self::Or),
            Token::AndAnd => Some(Self::And),
            Token::EqEq => Some(Self::Eq),
            Token::NotEq => Some(Self::Ne),
            Token::Lt => Some(Self::Lt),
            Token::Le => Some(Self::Le),
            Token::Gt => Some(Self::Gt),
            Token::Ge => Some(Self::Ge),
            Token::Plus => Some(Self::Add),
            Token::Minus => Some(Self::Sub),
            Token::Star => Some(Self::Mul),
            Token::Slash => Some(Self::Div),
            Token::Percent => Some(Self::Rem),
            _ => None,
        }
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

fn type_err(op: &str, value: &ExprValue) -> EngineError {
    EngineError::script(format!(
        "cannot apply '{op}' to {}",
        match value {
            ExprValue::Null => "null",
            ExprValue::Bool(_) => "a boolean",
            ExprValue::Number(_) => "a number",
            ExprValue::Str(_) => "a string",
        }
    ))
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or_else(|| self.tokens.last().map_or(0, |(o, _)| *o + 1), |(o, _)| *o)
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), EngineError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(what))
        }
    }

    fn err(&self, what: &str) -> EngineError {
        EngineError::script(format!(
            "invalid expression at offset {}: {what}",
            self.offset()
        ))
    }

    fn parse_expr(&mut self, min_prec: u8, depth: u32) -> Result<Expr, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::script("expression is nested too deeply"));
        }
        let mut left = self.parse_prefix(depth)?;
        while let Some(op) = self.peek().and_then(BinOp::from_token) {
            if op.precedence() < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_expr(op.precedence() + 1, depth + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_prefix(&mut self, depth: u32) -> Result<Expr, EngineError> {
        if depth > MAX_DEPTH {
            return Err(EngineError::script("expression is nested too deeply"));
        }
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(ExprValue::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(ExprValue::Str(s))),
            Some(Token::Minus) => Ok(Expr::Unary(
                UnaryOp::Neg,
                Box::new(self.parse_prefix(depth + 1)?),
            )),
            Some(Token::Bang) => Ok(Expr::Unary(
                UnaryOp::Not,
                Box::new(self.parse_prefix(depth + 1)?),
            )),
            Some(Token::LParen) => {
                let inner = self.parse_expr(0, depth + 1)?;
                self.expect(&Token::RParen, "expected ')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_ident(&name, depth),
            _ => Err(self.err("expected a value")),
        }
    }

    fn parse_ident(&mut self, name: &str, depth: u32) -> Result<Expr, EngineError> {
        match name {
            "true" => Ok(Expr::Literal(ExprValue::Bool(true))),
            "false" => Ok(Expr::Literal(ExprValue::Bool(false))),
            "null" | "undefined" => Ok(Expr::Literal(ExprValue::Null)),
            "VAR" => {
                self.expect(&Token::LParen, "expected '(' after VAR")?;
                let var_name = match self.next() {
                    Some(Token::Str(s)) => s,
                    _ => return Err(self.err("VAR() takes a quoted variable name")),
                };
                let default = if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    Some(Box::new(self.parse_expr(0, depth + 1)?))
                } else {
                    None
                };
                self.expect(&Token::RParen, "expected ')' to close VAR(")?;
                Ok(Expr::Var {
                    name: var_name,
                    default,
                })
            }
            other => Err(self.err(&format!("unknown name '{other}'"))),
        }
    }
}

/// Parse an expression string into a tree.
///
/// # Errors
///
/// Returns `EngineError::Script` on malformed, oversized, or over-nested
/// input.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(EngineError::script(format!(
            "expression is too long ({} bytes; max {MAX_EXPRESSION_LEN})",
            input.len()
        )));
    }
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(EngineError::script("empty expression"));
    }
    let expr = parser.parse_expr(0, 0)?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.err("unexpected trailing input"));
    }
    Ok(expr)
}

impl Expr {
    /// Evaluate the tree against a variable resolver.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Script` on a type error (e.g. arithmetic on
    /// a boolean). Unknown variables evaluate to null.
    pub fn eval(&self, vars: &dyn VarResolver) -> Result<ExprValue, EngineError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Var { name, default } => match vars.resolve(name) {
                Some(value) => Ok(value),
                None => default
                    .as_ref()
                    .map_or(Ok(ExprValue::Null), |d| d.eval(vars)),
            },
            Self::Unary(op, inner) => {
                let value = inner.eval(vars)?;
                match op {
                    UnaryOp::Not => Ok(ExprValue::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        ExprValue::Number(n) => Ok(ExprValue::Number(-n)),
                        other => Err(type_err("-", &other)),
                    },
                }
            }
            Self::Binary(op, left, right) => eval_binary(*op, left, right, vars),
        }
    }
}

fn eval_binary(
    op: BinOp,
    left: &Expr,
    right: &Expr,
    vars: &dyn VarResolver,
) -> Result<ExprValue, EngineError> {
    // Short-circuit the combinators before evaluating the right side.
    if op == BinOp::And {
        let lhs = left.eval(vars)?;
        if !lhs.is_truthy() {
            return Ok(ExprValue::Bool(false));
        }
        return Ok(ExprValue::Bool(right.eval(vars)?.is_truthy()));
    }
    if op == BinOp::Or {
        let lhs = left.eval(vars)?;
        if lhs.is_truthy() {
            return Ok(ExprValue::Bool(true));
        }
        return Ok(ExprValue::Bool(right.eval(vars)?.is_truthy()));
    }

    let lhs = left.eval(vars)?;
    let rhs = right.eval(vars)?;
    match op {
        BinOp::Eq => Ok(ExprValue::Bool(values_equal(&lhs, &rhs))),
        BinOp::Ne => Ok(ExprValue::Bool(!values_equal(&lhs, &rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &lhs, &rhs),
        BinOp::Add => {
            // '+' concatenates when either operand is a string.
            if matches!(lhs, ExprValue::Str(_)) || matches!(rhs, ExprValue::Str(_)) {
                Ok(ExprValue::Str(format!("{}{}", lhs.display(), rhs.display())))
            } else {
                arithmetic(op, &lhs, &rhs)
            }
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(op, &lhs, &rhs),
        BinOp::And | BinOp::Or => unreachable!("combinators handled above"),
    }
}

fn values_equal(lhs: &ExprValue, rhs: &ExprValue) -> bool {
    lhs == rhs
}

fn compare(op: BinOp, lhs: &ExprValue, rhs: &ExprValue) -> Result<ExprValue, EngineError> {
    let ordering = match (lhs, rhs) {
        (ExprValue::Number(a), ExprValue::Number(b)) => a.partial_cmp(b),
        (ExprValue::Str(a), ExprValue::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EngineError::script(
                "comparison requires two numbers or two strings",
            ));
        }
    };
    let Some(ordering) = ordering else {
        return Ok(ExprValue::Bool(false)); // NaN compares false
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!("compare() only handles ordering operators"),
    };
    Ok(ExprValue::Bool(result))
}

fn arithmetic(op: BinOp, lhs: &ExprValue, rhs: &ExprValue) -> Result<ExprValue, EngineError> {
    let op_name = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        _ => unreachable!("arithmetic() only handles arithmetic operators"),
    };
    let (ExprValue::Number(a), ExprValue::Number(b)) = (lhs, rhs) else {
        let offender = if matches!(lhs, ExprValue::Number(_)) {
            rhs
        } else {
            lhs
        };
        return Err(type_err(op_name, offender));
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => unreachable!(),
    };
    Ok(ExprValue::Number(result))
}
