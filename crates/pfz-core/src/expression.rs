//! Rule antecedents as an explicit boolean expression tree.
//!
//! Leaves name a `(variable, term)` pair; `And` takes the minimum of its
//! operands and `Or` the maximum (Zadeh connectives). Trees are either built
//! in code with [`RuleExpression::is`] / [`and`](RuleExpression::and) /
//! [`or`](RuleExpression::or) or parsed from the textual form used in
//! rule-base documents:
//!
//! ```text
//! depth is ideal and (sst is ideal_1 or sla is low)
//! ```
//!
//! `and` binds tighter than `or`; `&` and `|` are accepted as synonyms.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpression {
    Leaf { variable: String, term: String },
    And(Box<RuleExpression>, Box<RuleExpression>),
    Or(Box<RuleExpression>, Box<RuleExpression>),
}

impl RuleExpression {
    /// Leaf clause "`variable` is `term`".
    pub fn is(variable: impl Into<String>, term: impl Into<String>) -> Self {
        RuleExpression::Leaf { variable: variable.into(), term: term.into() }
    }

    pub fn and(self, other: RuleExpression) -> Self {
        RuleExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: RuleExpression) -> Self {
        RuleExpression::Or(Box::new(self), Box::new(other))
    }

    /// Left-folded conjunction. `None` for an empty iterator.
    pub fn all<I: IntoIterator<Item = RuleExpression>>(operands: I) -> Option<Self> {
        operands.into_iter().reduce(RuleExpression::and)
    }

    /// Left-folded disjunction. `None` for an empty iterator.
    pub fn any<I: IntoIterator<Item = RuleExpression>>(operands: I) -> Option<Self> {
        operands.into_iter().reduce(RuleExpression::or)
    }

    /// Parse the textual form.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Parser::new(text)?.parse_all()
    }

    /// Firing strength against named memberships
    /// (`variable -> term -> degree`).
    ///
    /// Fails only when a leaf names something absent from `fuzzified`,
    /// which points at a malformed rule base rather than bad data.
    pub fn strength(
        &self,
        fuzzified: &HashMap<String, HashMap<String, f64>>,
    ) -> Result<f64, ConfigError> {
        match self {
            RuleExpression::Leaf { variable, term } => {
                let terms = fuzzified
                    .get(variable)
                    .ok_or_else(|| ConfigError::UnknownVariable(variable.clone()))?;
                terms.get(term).copied().ok_or_else(|| ConfigError::UnknownTerm {
                    variable: variable.clone(),
                    term: term.clone(),
                })
            }
            RuleExpression::And(l, r) => Ok(l.strength(fuzzified)?.min(r.strength(fuzzified)?)),
            RuleExpression::Or(l, r) => Ok(l.strength(fuzzified)?.max(r.strength(fuzzified)?)),
        }
    }

    /// Every `(variable, term)` leaf, left to right.
    pub fn leaves(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        match self {
            RuleExpression::Leaf { variable, term } => out.push((variable, term)),
            RuleExpression::And(l, r) | RuleExpression::Or(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
        }
    }

    /// Resolve names to flat membership slots.
    pub(crate) fn compile<F>(&self, resolve: &F) -> Result<CompiledExpr, ConfigError>
    where
        F: Fn(&str, &str) -> Result<usize, ConfigError>,
    {
        Ok(match self {
            RuleExpression::Leaf { variable, term } => CompiledExpr::Leaf(resolve(variable, term)?),
            RuleExpression::And(l, r) => {
                CompiledExpr::And(Box::new(l.compile(resolve)?), Box::new(r.compile(resolve)?))
            }
            RuleExpression::Or(l, r) => {
                CompiledExpr::Or(Box::new(l.compile(resolve)?), Box::new(r.compile(resolve)?))
            }
        })
    }

    /// Operands fold to the left when parsed, so a right operand that is
    /// itself a binary node of equal or lower precedence needs parentheses.
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parenthesize: bool) -> fmt::Result {
        if parenthesize {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpression::Leaf { variable, term } => write!(f, "{variable} is {term}"),
            RuleExpression::And(l, r) => {
                l.fmt_operand(f, matches!(**l, RuleExpression::Or(..)))?;
                f.write_str(" and ")?;
                r.fmt_operand(f, !matches!(**r, RuleExpression::Leaf { .. }))
            }
            RuleExpression::Or(l, r) => {
                l.fmt_operand(f, false)?;
                f.write_str(" or ")?;
                r.fmt_operand(f, matches!(**r, RuleExpression::Or(..)))
            }
        }
    }
}

impl FromStr for RuleExpression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleExpression::parse(s)
    }
}

/// Expression with leaves resolved to indices into a flat membership buffer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledExpr {
    Leaf(usize),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
}

impl CompiledExpr {
    pub(crate) fn strength(&self, memberships: &[f64]) -> f64 {
        match self {
            CompiledExpr::Leaf(slot) => memberships[*slot],
            CompiledExpr::And(l, r) => l.strength(memberships).min(r.strength(memberships)),
            CompiledExpr::Or(l, r) => l.strength(memberships).max(r.strength(memberships)),
        }
    }
}

// ── Parser ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Is,
    And,
    Or,
    Open,
    Close,
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

fn parse_error(offset: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::Parse { offset, message: message.into() }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(at, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((at, Token::Open));
            }
            ')' => {
                chars.next();
                tokens.push((at, Token::Close));
            }
            '&' => {
                chars.next();
                tokens.push((at, Token::And));
            }
            '|' => {
                chars.next();
                tokens.push((at, Token::Or));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match word.to_ascii_lowercase().as_str() {
                    "is" => Token::Is,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Ident(word),
                };
                tokens.push((at, token));
            }
            other => return Err(parse_error(at, format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

impl Parser {
    fn new(text: &str) -> Result<Self, ConfigError> {
        Ok(Self { tokens: tokenize(text)?, pos: 0, len: text.len() })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(at, _)| *at).unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn parse_all(mut self) -> Result<RuleExpression, ConfigError> {
        if self.tokens.is_empty() {
            return Err(parse_error(0, "empty expression"));
        }
        let expr = self.parse_or()?;
        if self.pos < self.tokens.len() {
            return Err(parse_error(self.offset(), "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<RuleExpression, ConfigError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            lhs = lhs.or(self.parse_and()?);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<RuleExpression, ConfigError> {
        let mut lhs = self.parse_atom()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            lhs = lhs.and(self.parse_atom()?);
        }
        Ok(lhs)
    }

    fn parse_atom(&mut self) -> Result<RuleExpression, ConfigError> {
        let at = self.offset();
        match self.next() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                let close_at = self.offset();
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(parse_error(close_at, "expected ')'")),
                }
            }
            Some(Token::Ident(variable)) => {
                let is_at = self.offset();
                if self.next() != Some(Token::Is) {
                    return Err(parse_error(is_at, format!("expected 'is' after '{variable}'")));
                }
                let term_at = self.offset();
                match self.next() {
                    Some(Token::Ident(term)) => Ok(RuleExpression::is(variable, term)),
                    _ => Err(parse_error(term_at, "expected a term name")),
                }
            }
            _ => Err(parse_error(at, "expected '(' or a clause")),
        }
    }
}
