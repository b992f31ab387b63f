//! Computed fact columns.

use clinicmart_types::{Record, Table, Value};

use crate::config::types::DeriveRule;

pub fn apply_derivations(table: &mut Table, rules: &[DeriveRule]) {
    for rule in rules {
        table.fill_column(rule.target(), |row| evaluate(rule, row));
    }
}

fn evaluate(rule: &DeriveRule, row: &Record) -> Value {
    match rule {
        DeriveRule::Label {
            source,
            equals,
            then,
            otherwise,
            ..
        } => {
            if row.get(source).join_key().as_deref() == Some(equals.as_str()) {
                Value::from(then.as_str())
            } else {
                Value::from(otherwise.as_str())
            }
        }
        DeriveRule::Product { left, right, .. } => product(row.get(left), row.get(right)),
    }
}

/// Integer product when both sides are integers and it fits, float otherwise.
/// A null or non-numeric operand yields null.
#[must_use]
pub fn product(left: &Value, right: &Value) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        if let Some(p) = a.checked_mul(*b) {
            return Value::Int(p);
        }
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Value::Float(a * b),
        _ => Value::Null,
    }
}
