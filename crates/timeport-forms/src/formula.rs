//! Sandboxed arithmetic formulas for custom calculations
//!
//! A formula is parsed once into an [`Expr`] tree and evaluated against a
//! field lookup. The language has numeric literals, field references,
//! `+ - * / %`, unary minus, parentheses and a handful of pure functions.
//! Nothing else is reachable from a formula.
//!
//! ```text
//! formula := expr EOF
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := ("-" | "+") unary | primary
//! primary := NUMBER | IDENT "(" args ")" | IDENT | "{" any-but-brace "}" | "(" expr ")"
//! ```

use thiserror::Error;

/// Default nesting limit
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected '{token}' at {pos}")]
    UnexpectedToken { token: String, pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unterminated field reference starting at {0}")]
    UnterminatedReference(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{name} takes {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("formula nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("unresolved field '{0}'")]
    Unresolved(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Field(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Field(s) => format!("{{{}}}", s),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .ok_or(FormulaError::UnterminatedReference(start))?;
                let name: String = chars[i + 1..i + 1 + close].iter().collect();
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(FormulaError::UnexpectedToken {
                        token: "{}".into(),
                        pos: start,
                    });
                }
                i += close + 2;
                tokens.push((Token::Field(name), start));
                continue;
            }
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::InvalidNumber(text.clone()))?;
                tokens.push((Token::Number(n), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((Token::Ident(chars[start..i].iter().collect()), start));
                continue;
            }
            other => return Err(FormulaError::UnexpectedChar { ch: other, pos: start }),
        };
        tokens.push((token, start));
        i += 1;
    }

    Ok(tokens)
}

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Built-in pure functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Round,
    Floor,
    Ceil,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            "floor" => Some(Self::Floor),
            "ceil" => Some(Self::Ceil),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    fn check_arity(&self, got: usize) -> Result<(), FormulaError> {
        let (ok, expected) = match self {
            Self::Abs | Self::Floor | Self::Ceil => (got == 1, "1"),
            Self::Round => ((1..=2).contains(&got), "1 or 2"),
            Self::Min | Self::Max => (got >= 1, "at least 1"),
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                name: self.name(),
                expected,
                got,
            })
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        match self {
            Self::Abs => args[0].abs(),
            Self::Floor => args[0].floor(),
            Self::Ceil => args[0].ceil(),
            Self::Round => match args.get(1) {
                Some(digits) => {
                    let factor = 10f64.powi(digits.trunc() as i32);
                    (args[0] * factor).round() / factor
                }
                None => args[0].round(),
            },
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Parsed formula tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Field(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) => inner.collect_fields(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_fields(out)),
        }
    }

    fn eval<F>(&self, lookup: &F) -> Result<f64, FormulaError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Field(name) => lookup(name).ok_or_else(|| FormulaError::Unresolved(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(lookup)?),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(lookup)?;
                let r = rhs.eval(lookup)?;
                match op {
                    BinOp::Add => Ok(l + r),
                    BinOp::Sub => Ok(l - r),
                    BinOp::Mul => Ok(l * r),
                    BinOp::Div | BinOp::Rem if r == 0.0 => Err(FormulaError::DivisionByZero),
                    BinOp::Div => Ok(l / r),
                    BinOp::Rem => Ok(l % r),
                }
            }
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(lookup))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(func.apply(&values))
            }
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, pos)) => Err(FormulaError::UnexpectedToken {
                token: token.describe(),
                pos,
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        self.descend()?;
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            Some(Token::Percent) => Some(BinOp::Rem),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Field(name), _)) => Ok(Expr::Field(name)),
            Some((Token::Ident(name), _)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let func = Function::lookup(&name)
                        .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                    let args = self.args()?;
                    func.check_arity(args.len())?;
                    Ok(Expr::Call { func, args })
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Some((Token::LParen, _)) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some((token, pos)) => Err(FormulaError::UnexpectedToken {
                token: token.describe(),
                pos,
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(args),
                Some((token, pos)) => {
                    return Err(FormulaError::UnexpectedToken {
                        token: token.describe(),
                        pos,
                    })
                }
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }
}

/// A parsed, reusable formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse with the default nesting limit
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        Self::parse_with_depth(source, DEFAULT_MAX_DEPTH)
    }

    pub fn parse_with_depth(source: &str, max_depth: usize) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        };
        let expr = parser.expr()?;
        if let Some((token, pos)) = parser.next() {
            return Err(FormulaError::UnexpectedToken {
                token: token.describe(),
                pos,
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Field references in first-use order, without duplicates
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.expr.collect_fields(&mut out);
        out
    }

    /// Evaluate; any reference the lookup cannot resolve aborts the evaluation
    pub fn evaluate<F>(&self, lookup: F) -> Result<f64, FormulaError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let result = self.expr.eval(&lookup)?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(FormulaError::NotFinite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eval(source: &str, vars: &[(&str, f64)]) -> Result<f64, FormulaError> {
        let vars: HashMap<_, _> = vars.iter().cloned().collect();
        Formula::parse(source)?.evaluate(|name| vars.get(name).copied())
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4", &[]), Ok(14.0));
        assert_eq!(eval("(2 + 3) * 4", &[]), Ok(20.0));
        assert_eq!(eval("10 - 4 - 3", &[]), Ok(3.0));
        assert_eq!(eval("100 / 10 / 5", &[]), Ok(2.0));
        assert_eq!(eval("7 % 4", &[]), Ok(3.0));
        assert_eq!(eval("-2 * -3", &[]), Ok(6.0));
    }

    #[test]
    fn test_field_references() {
        assert_eq!(eval("hours * rate", &[("hours", 7.5), ("rate", 20.0)]), Ok(150.0));
        assert_eq!(eval("{end-time} - {start time}", &[("end-time", 9.0), ("start time", 1.0)]), Ok(8.0));

        let formula = Formula::parse("a + b * a - {c}").unwrap();
        assert_eq!(formula.references(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unresolved_reference_aborts() {
        assert_eq!(
            eval("hours * rate", &[("hours", 8.0)]),
            Err(FormulaError::Unresolved("rate".into()))
        );
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("round(2.346, 2)", &[]), Ok(2.35));
        assert_eq!(eval("max(1, x, 3)", &[("x", 9.0)]), Ok(9.0));
        assert_eq!(eval("min(4, 2)", &[]), Ok(2.0));
        assert_eq!(eval("abs(-3) + floor(1.7) + ceil(1.2)", &[]), Ok(6.0));
        assert_eq!(
            Formula::parse("system(1)"),
            Err(FormulaError::UnknownFunction("system".into()))
        );
        assert!(matches!(Formula::parse("abs(1, 2)"), Err(FormulaError::Arity { .. })));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / (2 - 2)", &[]), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("1 % 0", &[]), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(Formula::parse("   "), Err(FormulaError::Empty));
        assert_eq!(Formula::parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert!(matches!(Formula::parse("1 2"), Err(FormulaError::UnexpectedToken { .. })));
        assert!(matches!(Formula::parse("a; b"), Err(FormulaError::UnexpectedChar { ch: ';', .. })));
        assert_eq!(Formula::parse("{a"), Err(FormulaError::UnterminatedReference(0)));
        assert!(matches!(Formula::parse("1..2"), Err(FormulaError::InvalidNumber(_))));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(Formula::parse(&deep), Err(FormulaError::TooDeep(DEFAULT_MAX_DEPTH)));
        assert!(Formula::parse_with_depth(&deep, 200).is_ok());

        let negations = format!("{}1", "-".repeat(100));
        assert!(matches!(Formula::parse(&negations), Err(FormulaError::TooDeep(_))));
    }
}
