//! Parser for the compact condition strings attached to questions and
//! questiongroups.
//!
//! Two dialects exist:
//!
//! * comparison conditions, `"<op><literal>|<target>"`, used by
//!   `question_conditions` and `questiongroup_conditions`
//!   (e.g. `"=='tech_lu_cropland'|tech_qg_10"`);
//! * value conditions, `"<value>|<bool>|<target>"`, used by `conditions`
//!   on choice questions (e.g. `"value_13|True|key_sub"`).

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("expected a comparison operator (==, !=, <=, >=, <, >)")]
    MissingOperator,
    #[error("expected a quoted string or integer literal")]
    MalformedLiteral,
    #[error("needs to have form \"expression|target\"")]
    MissingTarget,
    #[error("needs to have form \"value|condition|target\"")]
    MalformedValueCondition,
    #[error("boolean literal must be \"True\" or \"False\", got '{0}'")]
    MalformedBool(String),
    #[error("target '{0}' contains invalid characters")]
    MalformedTarget(String),
    #[error("trailing input after condition")]
    TrailingInput,
}

/// Comparison operators of the condition mini-language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lte,
    Gte,
    Lt,
    Gt,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lte => "<=",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
        }
    }
}

/// Literal operand of a comparison condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
}

impl Literal {
    /// Compare an answer value against this literal.
    pub fn matches(&self, op: CmpOp, value: &Value) -> bool {
        match (self, value) {
            (Literal::Str(literal), Value::String(text)) => match op {
                CmpOp::Eq => text == literal,
                CmpOp::Ne => text != literal,
                CmpOp::Lt => text.as_str() < literal.as_str(),
                CmpOp::Lte => text.as_str() <= literal.as_str(),
                CmpOp::Gt => text.as_str() > literal.as_str(),
                CmpOp::Gte => text.as_str() >= literal.as_str(),
            },
            (Literal::Int(literal), value) => {
                let Some(number) = value.as_i64() else {
                    return false;
                };
                match op {
                    CmpOp::Eq => number == *literal,
                    CmpOp::Ne => number != *literal,
                    CmpOp::Lt => number < *literal,
                    CmpOp::Lte => number <= *literal,
                    CmpOp::Gt => number > *literal,
                    CmpOp::Gte => number >= *literal,
                }
            }
            _ => false,
        }
    }
}

/// Parsed comparison condition: `(op, literal, target)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonCondition {
    pub op: CmpOp,
    pub literal: Literal,
    pub target: String,
    pub raw: String,
}

impl ComparisonCondition {
    /// Whether the given answer value activates the target.
    pub fn evaluate(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|item| self.literal.matches(self.op, item)),
            other => self.literal.matches(self.op, other),
        }
    }
}

/// Parsed value condition: `(value, bool, target)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCondition {
    pub value: String,
    pub active: bool,
    pub target: String,
    pub raw: String,
}

/// Parse a comparison condition (dialect used by `question_conditions` and
/// `questiongroup_conditions`).
pub fn parse_comparison(input: &str) -> Result<ComparisonCondition, ConditionError> {
    let mut parser = Parser::new(input);
    let op = parser.operator()?;
    parser.skip_whitespace();
    let literal = parser.literal()?;
    parser.expect_pipe()?;
    let target = parser.ident()?;
    parser.end()?;
    Ok(ComparisonCondition {
        op,
        literal,
        target,
        raw: input.to_string(),
    })
}

/// Parse a value condition (dialect used by `conditions` on choice
/// questions).
pub fn parse_value_condition(input: &str) -> Result<ValueCondition, ConditionError> {
    let mut parts = input.split('|');
    let (Some(value), Some(active), Some(target), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ConditionError::MalformedValueCondition);
    };
    let active = match active {
        "True" => true,
        "False" => false,
        other => return Err(ConditionError::MalformedBool(other.to_string())),
    };
    if value.is_empty() {
        return Err(ConditionError::MalformedValueCondition);
    }
    if target.is_empty() || !target.chars().all(is_ident_char) {
        return Err(ConditionError::MalformedTarget(target.to_string()));
    }
    Ok(ValueCondition {
        value: value.to_string(),
        active,
        target: target.to_string(),
        raw: input.to_string(),
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { rest: input }
    }

    fn operator(&mut self) -> Result<CmpOp, ConditionError> {
        // Two-character operators first.
        for (token, op) in [
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<=", CmpOp::Lte),
            (">=", CmpOp::Gte),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ] {
            if let Some(rest) = self.rest.strip_prefix(token) {
                self.rest = rest;
                return Ok(op);
            }
        }
        Err(ConditionError::MissingOperator)
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn literal(&mut self) -> Result<Literal, ConditionError> {
        if let Some(rest) = self.rest.strip_prefix('\'') {
            let Some(end) = rest.find('\'') else {
                return Err(ConditionError::MalformedLiteral);
            };
            let text = &rest[..end];
            self.rest = &rest[end + 1..];
            return Ok(Literal::Str(text.to_string()));
        }
        let digits = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        if digits == 0 {
            return Err(ConditionError::MalformedLiteral);
        }
        let (number, rest) = self.rest.split_at(digits);
        self.rest = rest;
        number
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| ConditionError::MalformedLiteral)
    }

    fn expect_pipe(&mut self) -> Result<(), ConditionError> {
        match self.rest.strip_prefix('|') {
            Some(rest) => {
                self.rest = rest;
                Ok(())
            }
            None => Err(ConditionError::MissingTarget),
        }
    }

    fn ident(&mut self) -> Result<String, ConditionError> {
        let end = self
            .rest
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(ConditionError::MalformedTarget(self.rest.to_string()));
        }
        let (ident, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(ident.to_string())
    }

    fn end(&mut self) -> Result<(), ConditionError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ConditionError::TrailingInput)
        }
    }
}
