//! Typed coercion of dirty field values
//!
//! Every target type has a closed table of accepted input shapes. Anything
//! outside the table falls back to the caller's default; the result records
//! how the value was obtained so the normalizer can warn about it.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Textual speed descriptors and their numeric equivalents (km/h)
pub const SPEED_MAP: [(&str, f64); 4] = [
    ("low", 10.0),
    ("medium", 200.0),
    ("high", 600.0),
    ("very_high", 900.0),
];

const TRUE_TOKENS: [&str; 5] = ["true", "1", "yes", "y", "t"];
const FALSE_TOKENS: [&str; 5] = ["false", "0", "no", "n", "f"];

/// How a coerced value was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced<T> {
    /// Field absent or `null`; default used
    Missing(T),
    /// Value already had (or directly parsed to) the target type
    Parsed(T),
    /// Value recovered from a non-numeric representation (descriptor, unit suffix)
    Mapped(T),
    /// Value present but unusable; default used
    Defaulted(T),
}

impl<T: Copy> Coerced<T> {
    pub fn value(&self) -> T {
        match *self {
            Coerced::Missing(v) | Coerced::Parsed(v) | Coerced::Mapped(v) | Coerced::Defaulted(v) => v,
        }
    }

    /// True when the original value deserves a warning
    pub fn is_lossy(&self) -> bool {
        matches!(self, Coerced::Mapped(_) | Coerced::Defaulted(_))
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn numeric_prefix(s: &str) -> Option<f64> {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"^[0-9.\-]+").expect("static regex"));
    re.find(s).and_then(|m| parse_finite(m.as_str()))
}

fn float_to_int(f: f64) -> i64 {
    // `as` saturates at the i64 bounds
    f.trunc() as i64
}

/// Coerce to an integer: integers, reals (truncated), numeric strings
pub fn coerce_int(value: Option<&Value>, default: i64) -> Coerced<i64> {
    match value {
        None | Some(Value::Null) => Coerced::Missing(default),
        Some(Value::Bool(b)) => Coerced::Parsed(i64::from(*b)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Coerced::Parsed(i)
            } else if let Some(u) = n.as_u64() {
                Coerced::Parsed(i64::try_from(u).unwrap_or(i64::MAX))
            } else {
                match n.as_f64().filter(|f| f.is_finite()) {
                    Some(f) => Coerced::Parsed(float_to_int(f)),
                    None => Coerced::Defaulted(default),
                }
            }
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Coerced::Parsed(i)
            } else if let Some(f) = parse_finite(s) {
                Coerced::Parsed(float_to_int(f))
            } else {
                Coerced::Defaulted(default)
            }
        }
        Some(_) => Coerced::Defaulted(default),
    }
}

/// Coerce to a real: numbers, numeric strings, speed descriptors, numeric prefixes
pub fn coerce_float(value: Option<&Value>, default: f64) -> Coerced<f64> {
    match value {
        None | Some(Value::Null) => Coerced::Missing(default),
        Some(Value::Bool(b)) => Coerced::Parsed(if *b { 1.0 } else { 0.0 }),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => Coerced::Parsed(f),
            None => Coerced::Defaulted(default),
        },
        Some(Value::String(s)) => {
            let val = s.trim().to_lowercase();
            if let Some(f) = parse_finite(&val) {
                return Coerced::Parsed(f);
            }
            if let Some((_, speed)) = SPEED_MAP.iter().find(|(name, _)| *name == val) {
                return Coerced::Mapped(*speed);
            }
            match numeric_prefix(&val) {
                Some(f) => Coerced::Mapped(f),
                None => Coerced::Defaulted(default),
            }
        }
        Some(_) => Coerced::Defaulted(default),
    }
}

/// Coerce to a boolean: booleans, numbers (nonzero is true), yes/no tokens
pub fn coerce_bool(value: Option<&Value>, default: bool) -> Coerced<bool> {
    match value {
        None | Some(Value::Null) => Coerced::Missing(default),
        Some(Value::Bool(b)) => Coerced::Parsed(*b),
        Some(Value::Number(n)) => Coerced::Parsed(n.as_f64().map(|f| f != 0.0).unwrap_or(default)),
        Some(Value::String(s)) => {
            let v = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(&v.as_str()) {
                Coerced::Parsed(true)
            } else if FALSE_TOKENS.contains(&v.as_str()) {
                Coerced::Parsed(false)
            } else {
                Coerced::Defaulted(default)
            }
        }
        Some(_) => Coerced::Defaulted(default),
    }
}

pub fn safe_int(value: Option<&Value>, default: i64) -> i64 {
    coerce_int(value, default).value()
}

pub fn safe_float(value: Option<&Value>, default: f64) -> f64 {
    coerce_float(value, default).value()
}

pub fn safe_bool(value: Option<&Value>, default: bool) -> bool {
    coerce_bool(value, default).value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_float_descriptors() {
        assert_eq!(safe_float(Some(&json!("low")), 0.0), 10.0);
        assert_eq!(safe_float(Some(&json!("medium")), 0.0), 200.0);
        assert_eq!(safe_float(Some(&json!("HIGH")), 0.0), 600.0);
        assert_eq!(safe_float(Some(&json!(" very_high ")), 0.0), 900.0);
    }

    #[test]
    fn test_safe_float_edge_values() {
        assert_eq!(safe_float(Some(&json!("12.5km")), 0.0), 12.5);
        assert_eq!(safe_float(None, 0.0), 0.0);
        assert_eq!(safe_float(Some(&Value::Null), 0.0), 0.0);
        assert_eq!(safe_float(Some(&json!("abc")), 0.0), 0.0);
        assert_eq!(safe_float(Some(&json!("km12")), 0.0), 0.0);
        assert_eq!(safe_float(Some(&json!("42")), 0.0), 42.0);
        assert_eq!(safe_float(Some(&json!(3)), 0.0), 3.0);
        assert_eq!(safe_float(Some(&json!(true)), 0.0), 1.0);
        assert_eq!(safe_float(Some(&json!([1])), 0.0), 0.0);
    }

    #[test]
    fn test_coerce_float_provenance() {
        assert!(matches!(coerce_float(Some(&json!("low")), 0.0), Coerced::Mapped(_)));
        assert!(matches!(coerce_float(Some(&json!("12.5km")), 0.0), Coerced::Mapped(_)));
        assert!(matches!(coerce_float(Some(&json!("abc")), 0.0), Coerced::Defaulted(_)));
        assert!(matches!(coerce_float(Some(&json!("7.5")), 0.0), Coerced::Parsed(_)));
        assert!(matches!(coerce_float(None, 0.0), Coerced::Missing(_)));
        assert!(!coerce_float(Some(&json!(1.0)), 0.0).is_lossy());
        assert!(coerce_float(Some(&json!("high")), 0.0).is_lossy());
    }

    #[test]
    fn test_safe_int() {
        assert_eq!(safe_int(Some(&json!("3.9")), 0), 3);
        assert_eq!(safe_int(Some(&json!(true)), 0), 1);
        assert_eq!(safe_int(None, 0), 0);
        assert_eq!(safe_int(Some(&json!("3")), 0), 3);
        assert_eq!(safe_int(Some(&json!(" 12 ")), 0), 12);
        assert_eq!(safe_int(Some(&json!(4.99)), 0), 4);
        assert_eq!(safe_int(Some(&json!(-2.5)), 0), -2);
        assert_eq!(safe_int(Some(&json!("many")), 1), 1);
        assert_eq!(safe_int(Some(&json!({"a": 1})), 7), 7);
        assert!(coerce_int(Some(&json!("many")), 1).is_lossy());
        assert!(!coerce_int(Some(&json!("3")), 1).is_lossy());
    }

    #[test]
    fn test_safe_bool() {
        assert!(safe_bool(Some(&json!("YES")), false));
        assert!(!safe_bool(Some(&json!("n")), true));
        assert!(safe_bool(Some(&json!("maybe")), true));
        assert!(!safe_bool(Some(&json!("maybe")), false));
        assert!(safe_bool(Some(&json!(2)), false));
        assert!(!safe_bool(Some(&json!(0.0)), true));
        assert!(safe_bool(Some(&json!("T")), false));
        assert!(!safe_bool(None, false));
        assert!(coerce_bool(Some(&json!("maybe")), false).is_lossy());
    }
}
