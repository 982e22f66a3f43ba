//! Condition keys (`id{}`, `date>=`, `name$`, ...) and their evaluation
//! against a row.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use super::errors::DatabaseError;
use crate::request::keys::is_name;
use crate::request::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
}

// Longest suffixes first.
const SUFFIXES: [(&str, Operator); 8] = [
    ("!{}", Operator::NotIn),
    ("{}", Operator::In),
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("$", Operator::Like),
    ("!", Operator::Ne),
];

/// Splits `userId{}` into `("userId", In)`.
pub fn parse_condition_key(key: &str) -> Result<(&str, Operator), DatabaseError> {
    let (field, op) = SUFFIXES
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(*suffix).map(|field| (field, *op)))
        .unwrap_or((key, Operator::Eq));
    if !is_name(field) {
        return Err(DatabaseError::UnsupportedCondition(key.to_string()));
    }
    Ok((field, op))
}

/// A compiled `field <op> operand` test.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub operand: Value,
    pattern: Option<Regex>,
}

impl Predicate {
    pub fn new(key: &str, operand: Value) -> Result<Self, DatabaseError> {
        let (field, op) = parse_condition_key(key)?;
        let pattern = match op {
            Operator::Like => {
                let text = operand.as_str().ok_or_else(|| DatabaseError::InvalidValue {
                    key: key.to_string(),
                    reason: "pattern must be a string".to_string(),
                })?;
                Some(like_pattern(text).map_err(|e| DatabaseError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?)
            }
            Operator::In | Operator::NotIn if !operand.is_array() => {
                return Err(DatabaseError::InvalidValue {
                    key: key.to_string(),
                    reason: "expected an array".to_string(),
                })
            }
            _ => None,
        };
        Ok(Self {
            field: field.to_string(),
            op,
            operand,
            pattern,
        })
    }

    pub fn matches(&self, row: &JsonMap) -> bool {
        let value = row.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            Operator::Eq => values_equal(value, &self.operand),
            Operator::Ne => !values_equal(value, &self.operand),
            Operator::In => self.in_operand(value),
            Operator::NotIn => !self.in_operand(value),
            Operator::Gt => compare_values(value, &self.operand) == Some(Ordering::Greater),
            Operator::Lt => compare_values(value, &self.operand) == Some(Ordering::Less),
            Operator::Ge => matches!(
                compare_values(value, &self.operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Le => matches!(
                compare_values(value, &self.operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Like => match (&self.pattern, value) {
                (Some(re), Value::String(s)) => re.is_match(s),
                _ => false,
            },
        }
    }

    fn in_operand(&self, value: &Value) -> bool {
        self.operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(value, item)))
    }
}

/// Numbers compare by value regardless of integer/float representation.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for `@order`: nulls first, then booleans, numbers,
/// strings.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    compare_values(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn like_pattern(text: &str) -> Result<Regex, regex::Error> {
    let mut source = String::from("^");
    for c in text.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source)
}
