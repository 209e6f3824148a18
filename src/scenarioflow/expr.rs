//! Safe expression evaluation for `branch` conditions and
//! `action/execute_code` steps.
//!
//! Resolves the spec's open question on evaluator grammar (see
//! `SPEC_FULL.md` §9.1) by embedding `evalexpr` with a context built only
//! from resolved execution-context values — no custom functions are
//! registered, so the supported surface is exactly what `evalexpr` itself
//! parses: arithmetic, comparison, and boolean operators over variables
//! and literals. There are no function calls, no imports, and no access
//! to anything resembling a host object, because the context only ever
//! contains JSON scalars, arrays, and maps bridged to `evalexpr::Value`.
//! Anything that fails to parse is rejected with a `HandlerError`, never
//! silently ignored.

use evalexpr::{ContextWithMutableVariables, HashMapContext, Value as EValue};
use serde_json::Value;

use crate::scenarioflow::error::HandlerError;

/// Evaluates `expression` against `context` (a JSON object) and returns
/// its truthiness. Used by `branch` and by the legacy `condition` field.
///
/// `evalexpr` rejects comparisons between operands of different native
/// types (e.g. a numeric context variable against a string literal) with
/// a type-mismatch error rather than comparing them. When that happens
/// and `expression` is a single binary comparison, falls back to
/// `coerce_comparison_operands`'s numeric-then-string coercion (Open
/// Question #3) instead of surfacing the error.
pub fn eval_condition(expression: &str, context: &Value) -> Result<bool, HandlerError> {
    match eval(expression, context) {
        Ok(result) => Ok(result.as_boolean().unwrap_or_else(|_| truthy(&result))),
        Err(err) => match try_coerced_comparison(expression, context) {
            Some(result) => Ok(result),
            None => Err(err),
        },
    }
}

/// Evaluates `expression` against `context`, returning the resulting
/// value converted back to `serde_json::Value`. Used by
/// `action/execute_code`.
pub fn eval(expression: &str, context: &Value) -> Result<EValue, HandlerError> {
    let mut eval_ctx = HashMapContext::new();
    if let Value::Object(map) = context {
        for (key, value) in map {
            if let Some(evalue) = json_to_evalexpr(value) {
                eval_ctx
                    .set_value(key.clone(), evalue)
                    .map_err(|e| HandlerError::Failed(format!("context binding error: {}", e)))?;
            }
        }
    }
    evalexpr::eval_with_context(expression, &eval_ctx)
        .map_err(|e| HandlerError::Failed(format!("expression error: {}", e)))
}

pub fn eval_to_json(expression: &str, context: &Value) -> Result<Value, HandlerError> {
    let result = eval(expression, context)?;
    Ok(evalexpr_to_json(&result))
}

fn truthy(value: &EValue) -> bool {
    match value {
        EValue::Boolean(b) => *b,
        EValue::Int(i) => *i != 0,
        EValue::Float(f) => *f != 0.0,
        EValue::String(s) => !s.is_empty(),
        EValue::Empty => false,
        EValue::Tuple(t) => !t.is_empty(),
    }
}

/// Bridges a JSON scalar into `evalexpr`'s value space. Arrays/objects
/// have no useful representation in `evalexpr` and are skipped: branch
/// conditions and `execute_code` only ever compare scalars.
fn json_to_evalexpr(value: &Value) -> Option<EValue> {
    match value {
        Value::Null => Some(EValue::Empty),
        Value::Bool(b) => Some(EValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(EValue::Int(i))
            } else {
                n.as_f64().map(EValue::Float)
            }
        }
        Value::String(s) => Some(EValue::String(s.clone())),
        _ => None,
    }
}

fn evalexpr_to_json(value: &EValue) -> Value {
    match value {
        EValue::String(s) => Value::String(s.clone()),
        EValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        EValue::Int(i) => Value::Number((*i).into()),
        EValue::Boolean(b) => Value::Bool(*b),
        EValue::Tuple(items) => Value::Array(items.iter().map(evalexpr_to_json).collect()),
        EValue::Empty => Value::Null,
    }
}

/// Mixed-type comparison coercion (Open Question #3): when either operand
/// is non-numeric, both sides of a comparison are coerced to strings
/// before handing the expression to `evalexpr`, preserving the source's
/// numeric-then-string fallback for comparisons `evalexpr` itself can't
/// natively coerce.
pub fn coerce_comparison_operands(left: &Value, right: &Value) -> (Value, Value) {
    let both_numeric = left.is_number() && right.is_number();
    if both_numeric {
        (left.clone(), right.clone())
    } else {
        let to_str = |v: &Value| Value::String(crate::scenarioflow::model::value_to_display_string(v));
        (to_str(left), to_str(right))
    }
}

const COMPARISON_OPERATORS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];

/// Fallback for a single `left OP right` comparison that `evalexpr`
/// refused to evaluate because of a type mismatch. Resolves each operand
/// (a context key, or otherwise a JSON literal) and compares the
/// coerced pair directly. Returns `None` for anything other than a bare
/// binary comparison, leaving compound/boolean expressions to surface
/// their original `evalexpr` error.
fn try_coerced_comparison(expression: &str, context: &Value) -> Option<bool> {
    let trimmed = expression.trim();
    for op in COMPARISON_OPERATORS {
        let Some(pos) = trimmed.find(op) else { continue };
        // `<=`/`>=` contain `<`/`>`; only match the shorter operator if
        // the longer one isn't actually present at the same position.
        if (op == "<" || op == ">") && trimmed[pos..].starts_with(&format!("{}=", op)) {
            continue;
        }
        let left_text = trimmed[..pos].trim();
        let right_text = trimmed[pos + op.len()..].trim();
        if left_text.is_empty() || right_text.is_empty() {
            return None;
        }
        let left = resolve_operand(left_text, context)?;
        let right = resolve_operand(right_text, context)?;
        let (left, right) = coerce_comparison_operands(&left, &right);
        return Some(compare_coerced(&left, &right, op));
    }
    None
}

/// Resolves a single comparison operand: a context key if the text
/// names one, otherwise a JSON literal (number, bool, string, quoted
/// string). Returns `None` if neither applies.
fn resolve_operand(text: &str, context: &Value) -> Option<Value> {
    if let Some(value) = context.get(text) {
        return Some(value.clone());
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let unquoted = text.trim_matches(|c| c == '"' || c == '\'');
    Some(Value::String(unquoted.to_string()))
}

fn compare_coerced(left: &Value, right: &Value, op: &str) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<=" => l <= r,
            ">=" => l >= r,
            "<" => l < r,
            ">" => l > r,
            _ => false,
        };
    }
    let l = crate::scenarioflow::model::value_to_display_string(left);
    let r = crate::scenarioflow::model::value_to_display_string(right);
    match op {
        "==" => l == r,
        "!=" => l != r,
        "<=" => l <= r,
        ">=" => l >= r,
        "<" => l < r,
        ">" => l > r,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arithmetic_and_comparison_over_context_variables() {
        let ctx = json!({"x": 5});
        assert!(eval_condition("x > 0", &ctx).unwrap());
        assert!(!eval_condition("x < 0", &ctx).unwrap());
    }

    #[test]
    fn boolean_operators_supported() {
        let ctx = json!({"x": 5, "y": -1});
        assert!(eval_condition("x > 0 && y < 0", &ctx).unwrap());
    }

    #[test]
    fn unparseable_expression_is_rejected_not_ignored() {
        let ctx = json!({});
        let err = eval_condition("import os", &ctx).unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }

    #[test]
    fn execute_code_can_compute_a_value() {
        let ctx = json!({"a": 2, "b": 3});
        let result = eval_to_json("a * b + 1", &ctx).unwrap();
        assert_eq!(result, json!(7));
    }

    #[test]
    fn mixed_type_comparison_falls_back_to_coercion() {
        let ctx = json!({"count": 3});
        assert!(eval_condition("count == \"3\"", &ctx).unwrap());
        assert!(!eval_condition("count == \"4\"", &ctx).unwrap());
    }

    #[test]
    fn mixed_type_comparison_against_non_numeric_string_falls_back_to_string_compare() {
        let ctx = json!({"status": "done"});
        assert!(eval_condition("status == \"done\"", &ctx).unwrap());
    }
}
