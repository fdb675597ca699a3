//! Predicate evaluation for [`RecordStore::query`](crate::RecordStore::query).
//!
//! Operators arrive as string tokens from call sites written against the
//! original store, where `>` selected `current >= given` and `>=` selected
//! `current > given`. That mapping is kept as [`Dialect::Legacy`], the
//! default. [`Dialect::Strict`] gives the tokens their mathematical meaning.
//! Both dialects produce the same [`Operator`] values; only the token table
//! differs, so evaluation itself is never reversed.

use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Value;

use crate::error::StoreError;

/// Comparison applied between a record's field value (`current`) and the
/// value given to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `given` is an element of `current` (list element, substring, or
    /// object key).
    Contains,
}

/// Token table used when parsing an operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `>` means `>=` and `>=` means `>`.
    #[default]
    Legacy,
    Strict,
}

impl Operator {
    /// Parse an operator token. Returns `None` for unknown tokens.
    pub fn parse(token: &str, dialect: Dialect) -> Option<Self> {
        let op = match token {
            "is" | "=" | "==" => Self::Eq,
            "not" | "!=" | "!==" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => match dialect {
                Dialect::Legacy => Self::Ge,
                Dialect::Strict => Self::Gt,
            },
            ">=" => match dialect {
                Dialect::Legacy => Self::Gt,
                Dialect::Strict => Self::Ge,
            },
            "contains" | "in" => Self::Contains,
            _ => return None,
        };
        Some(op)
    }

    /// Whether `current op given` holds.
    ///
    /// Values of different kinds never satisfy an equality or ordering
    /// operator; `Ne` is the negation of `Eq` and so does match them.
    pub fn matches(self, current: &Value, given: &Value) -> bool {
        match self {
            Self::Eq => values_equal(current, given),
            Self::Ne => !values_equal(current, given),
            Self::Lt => compare(current, given) == Some(Ordering::Less),
            Self::Le => matches!(
                compare(current, given),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt => compare(current, given) == Some(Ordering::Greater),
            Self::Ge => matches!(
                compare(current, given),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Contains => contains(current, given),
        }
    }
}

impl FromStr for Operator {
    type Err = StoreError;

    /// Parses with the legacy token table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Dialect::Legacy).ok_or_else(|| StoreError::UnknownOperator(s.to_string()))
    }
}

/// Equality with numeric coercion: `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering between two values of the same kind. Lists compare
/// lexicographically. `None` when the kinds differ or aren't ordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        _ => None,
    }
}

fn contains(current: &Value, given: &Value) -> bool {
    match (current, given) {
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, given)),
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_tokens_swap_greater_than() {
        assert_eq!(Operator::parse(">", Dialect::Legacy), Some(Operator::Ge));
        assert_eq!(Operator::parse(">=", Dialect::Legacy), Some(Operator::Gt));
        assert_eq!(Operator::parse(">", Dialect::Strict), Some(Operator::Gt));
        assert_eq!(Operator::parse(">=", Dialect::Strict), Some(Operator::Ge));
        assert_eq!(">".parse::<Operator>().unwrap(), Operator::Ge);
    }

    #[test]
    fn test_token_aliases() {
        for token in ["is", "=", "=="] {
            assert_eq!(token.parse::<Operator>().unwrap(), Operator::Eq);
        }
        for token in ["not", "!=", "!=="] {
            assert_eq!(token.parse::<Operator>().unwrap(), Operator::Ne);
        }
        for token in ["contains", "in"] {
            assert_eq!(token.parse::<Operator>().unwrap(), Operator::Contains);
        }
        assert!(matches!(
            "~".parse::<Operator>(),
            Err(StoreError::UnknownOperator(t)) if t == "~"
        ));
    }

    #[test]
    fn test_numeric_comparisons_mix_ints_and_floats() {
        assert!(Operator::Eq.matches(&json!(1), &json!(1.0)));
        assert!(Operator::Lt.matches(&json!(1), &json!(1.5)));
        assert!(Operator::Ge.matches(&json!(2.0), &json!(2)));
        assert!(!Operator::Gt.matches(&json!(2), &json!(2)));
        assert!(Operator::Le.matches(&json!(-3), &json!(u64::MAX)));
    }

    #[test]
    fn test_mismatched_kinds_only_match_ne() {
        assert!(!Operator::Eq.matches(&json!("1"), &json!(1)));
        assert!(Operator::Ne.matches(&json!("1"), &json!(1)));
        assert!(!Operator::Lt.matches(&json!("1"), &json!(2)));
        assert!(!Operator::Ge.matches(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_contains_on_lists_strings_and_objects() {
        assert!(Operator::Contains.matches(&json!([1, 2, 3]), &json!(2)));
        assert!(!Operator::Contains.matches(&json!([1, 2, 3]), &json!(4)));
        assert!(Operator::Contains.matches(&json!("hello world"), &json!("lo w")));
        assert!(Operator::Contains.matches(&json!({"a": 1}), &json!("a")));
        assert!(!Operator::Contains.matches(&json!(12), &json!(1)));
    }

    #[test]
    fn test_lists_compare_lexicographically() {
        assert_eq!(compare(&json!([1, 2]), &json!([1, 3])), Some(Ordering::Less));
        assert_eq!(compare(&json!([1, 2]), &json!([1])), Some(Ordering::Greater));
        assert_eq!(compare(&json!([1, "a"]), &json!([1, 2])), None);
    }
}
