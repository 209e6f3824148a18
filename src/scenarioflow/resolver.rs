//! Context Resolver: recursive `{a.b.0.c}` template substitution against a
//! nested mapping. Ported from the exact-match-then-template-substitution
//! algorithm in `_resolve_value_from_context` / `resolve_string_template`
//! (the original scenario engine's context utilities), re-expressed over
//! `serde_json::Value`.
//!
//! `resolve` is a pure function: deterministic, no I/O, never mutates its
//! input context (P5), and idempotent once a result contains no further
//! placeholders (P4).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::scenarioflow::model::value_to_display_string;

const MAX_DEPTH: usize = 10;

static EXACT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\}$").unwrap());

static ANY_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\}").unwrap());

/// Resolves `value` against `context`, recursing element-wise through maps
/// and lists. See module docs for the algorithm.
pub fn resolve(value: &Value, context: &Value) -> Value {
    resolve_depth(value, context, 0)
}

fn resolve_depth(value: &Value, context: &Value, depth: usize) -> Value {
    match value {
        Value::String(s) => resolve_string(s, context, depth),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_depth(item, context, depth))
                .collect(),
        ),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_depth(v, context, depth));
            }
            Value::Object(resolved)
        }
        other => other.clone(),
    }
}

fn resolve_string(s: &str, context: &Value, depth: usize) -> Value {
    if let Some(caps) = EXACT_PLACEHOLDER.captures(s) {
        let path = caps.get(1).unwrap().as_str();
        if let Some(found) = navigate(context, path) {
            if depth < MAX_DEPTH {
                if let Value::String(inner) = &found {
                    if let Some(inner_caps) = EXACT_PLACEHOLDER.captures(inner) {
                        let inner_path = inner_caps.get(1).unwrap().as_str();
                        if inner_path != path {
                            return resolve_depth(&found, context, depth + 1);
                        }
                    }
                }
            }
            return found;
        }
        // Navigation failed; fall through to template substitution below.
    }
    Value::String(substitute_templates(s, context))
}

/// Finds every `{path}` placeholder in `s` and substitutes its resolved
/// display form. Placeholders that don't navigate are left literally.
fn substitute_templates(s: &str, context: &Value) -> String {
    ANY_PLACEHOLDER
        .replace_all(s, |caps: &regex::Captures| {
            let path = &caps[1];
            match navigate(context, path) {
                Some(found) => value_to_display_string(&found),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Walks `context` by dot-separated segments: object key lookup, or array
/// index lookup when a segment parses as an integer.
fn navigate(context: &Value, path: &str) -> Option<Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_placeholder_navigates_nested_path() {
        let ctx = json!({"a": {"b": [10, 20, {"c": "deep"}]}});
        let resolved = resolve(&json!("{a.b.2.c}"), &ctx);
        assert_eq!(resolved, json!("deep"));
    }

    #[test]
    fn exact_placeholder_preserves_non_string_type() {
        let ctx = json!({"x": 5});
        assert_eq!(resolve(&json!("{x}"), &ctx), json!(5));
    }

    #[test]
    fn unresolved_placeholder_is_left_literal_in_template_mode() {
        let ctx = json!({"user": "kitty"});
        let resolved = resolve(&json!("hello {user}, see {missing}"), &ctx);
        assert_eq!(resolved, json!("hello kitty, see {missing}"));
    }

    #[test]
    fn unresolved_exact_placeholder_falls_through_to_template() {
        let ctx = json!({});
        assert_eq!(resolve(&json!("{missing}"), &ctx), json!("{missing}"));
    }

    #[test]
    fn recurses_element_wise_over_maps_and_lists() {
        let ctx = json!({"user": "kitty", "n": 3});
        let value = json!({"greeting": "hi {user}", "list": ["{n}", "{user}"]});
        let resolved = resolve(&value, &ctx);
        assert_eq!(
            resolved,
            json!({"greeting": "hi kitty", "list": ["3", "kitty"]})
        );
    }

    #[test]
    fn never_mutates_its_context_argument() {
        let ctx = json!({"user": "kitty"});
        let before = ctx.clone();
        let _ = resolve(&json!("{user}"), &ctx);
        assert_eq!(ctx, before);
    }

    #[test]
    fn idempotent_once_no_placeholders_remain() {
        let ctx = json!({"user": "kitty"});
        let once = resolve(&json!("{user}"), &ctx);
        let twice = resolve(&once, &ctx);
        assert_eq!(once, twice);
    }

    #[test]
    fn chained_placeholder_indirection_recurses_up_to_depth_limit() {
        let ctx = json!({"a": "{b}", "b": "{c}", "c": "final"});
        assert_eq!(resolve(&json!("{a}"), &ctx), json!("final"));
    }

    #[test]
    fn self_referential_placeholder_does_not_recurse_forever() {
        let ctx = json!({"a": "{a}"});
        assert_eq!(resolve(&json!("{a}"), &ctx), json!("{a}"));
    }
}
