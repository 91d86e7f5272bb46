// SPDX-License-Identifier: MIT

//! Flow conditions evaluated by exclusive/inclusive gateways (§4.1).
//!
//! The spec does not mandate a BPMN FEEL/JUEL-compliant expression language
//! (an Open Question left to implementers, §9); this crate ships a small
//! comparison DSL — `name op literal` — sufficient to express the gateway
//! routing scenarios in §8 without pulling in a full expression engine for
//! a capability the spec never exercises beyond boolean/numeric routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wfe_core::VariableValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Always routes — used for unconditional flows out of non-gateway nodes.
    Always,
    /// A `name op literal` comparison over instance/token variables.
    Expr(String),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Always
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConditionError {
    #[error("malformed condition expression: {0:?}")]
    Malformed(String),
    #[error("unknown variable {0:?} referenced in condition")]
    UnknownVariable(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    pub fn evaluate(&self, vars: &HashMap<String, VariableValue>) -> Result<bool, ConditionError> {
        match self {
            Condition::Always => Ok(true),
            Condition::Expr(expr) => evaluate_expr(expr, vars),
        }
    }
}

fn evaluate_expr(
    expr: &str,
    vars: &HashMap<String, VariableValue>,
) -> Result<bool, ConditionError> {
    let expr = expr.trim();
    for (token, op) in [
        ("==", Op::Eq),
        ("!=", Op::Ne),
        ("<=", Op::Le),
        (">=", Op::Ge),
        ("<", Op::Lt),
        (">", Op::Gt),
    ] {
        if let Some((lhs, rhs)) = expr.split_once(token) {
            let name = lhs.trim();
            let literal = rhs.trim();
            let value = vars
                .get(name)
                .ok_or_else(|| ConditionError::UnknownVariable(name.to_string()))?;
            return compare(value, literal, op);
        }
    }
    // Bare variable name: truthy check for booleans.
    match vars.get(expr) {
        Some(VariableValue::Boolean(b)) => Ok(*b),
        Some(_) => Err(ConditionError::Malformed(expr.to_string())),
        None => Err(ConditionError::UnknownVariable(expr.to_string())),
    }
}

fn compare(value: &VariableValue, literal: &str, op: Op) -> Result<bool, ConditionError> {
    let ordering = match value {
        VariableValue::Integer(n) => {
            let lit: i64 = literal
                .parse()
                .map_err(|_| ConditionError::Malformed(literal.to_string()))?;
            n.cmp(&lit)
        }
        VariableValue::Float(n) => {
            let lit: f64 = literal
                .parse()
                .map_err(|_| ConditionError::Malformed(literal.to_string()))?;
            n.partial_cmp(&lit).ok_or_else(|| ConditionError::Malformed(literal.to_string()))?
        }
        VariableValue::Boolean(b) => {
            let lit: bool = literal
                .parse()
                .map_err(|_| ConditionError::Malformed(literal.to_string()))?;
            b.cmp(&lit)
        }
        VariableValue::String(s) => {
            let lit = literal.trim_matches('"').trim_matches('\'');
            s.as_str().cmp(lit)
        }
        VariableValue::Json(_) | VariableValue::Date(_) => {
            return Err(ConditionError::Malformed(
                "json/date variables are not comparable in gateway conditions".to_string(),
            ))
        }
    };
    Ok(match op {
        Op::Eq => ordering.is_eq(),
        Op::Ne => !ordering.is_eq(),
        Op::Lt => ordering.is_lt(),
        Op::Le => ordering.is_le(),
        Op::Gt => ordering.is_gt(),
        Op::Ge => ordering.is_ge(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, VariableValue)]) -> HashMap<String, VariableValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn always_evaluates_true() {
        assert!(Condition::Always.evaluate(&HashMap::new()).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let vars = vars(&[("amount", VariableValue::Integer(1000))]);
        assert!(Condition::Expr("amount >= 500".into()).evaluate(&vars).unwrap());
        assert!(!Condition::Expr("amount < 500".into()).evaluate(&vars).unwrap());
    }

    #[test]
    fn boolean_truthy_bare_name() {
        let vars = vars(&[("approved", VariableValue::Boolean(true))]);
        assert!(Condition::Expr("approved".into()).evaluate(&vars).unwrap());
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = Condition::Expr("missing == 1".into()).evaluate(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConditionError::UnknownVariable(_)));
    }
}
