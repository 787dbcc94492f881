//! Conversions for loosely typed attribute values.
//!
//! Upstream formats store years as integers, floats (`2020.0`), or
//! strings, and codes as either strings or numbers.

use serde_json::Value;

/// Renders a scalar property as a string. `null`, arrays, and objects
/// yield `None`.
#[must_use]
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Rounds a floating-point year to an integer, rejecting non-finite or
/// out-of-range values.
#[must_use]
pub fn normalize_year(year: f64) -> Option<i32> {
    let rounded = year.round();
    if rounded.is_finite() && rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        #[allow(clippy::cast_possible_truncation)]
        let year = rounded as i32;
        Some(year)
    } else {
        None
    }
}

/// Interprets a property as an integer year.
#[must_use]
pub fn value_as_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_f64().and_then(normalize_year),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(normalize_year),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn years_from_numbers_and_strings() {
        assert_eq!(value_as_year(&json!(2020)), Some(2020));
        assert_eq!(value_as_year(&json!(2019.0)), Some(2019));
        assert_eq!(value_as_year(&json!(2018.6)), Some(2019));
        assert_eq!(value_as_year(&json!(" 2021 ")), Some(2021));
        assert_eq!(value_as_year(&json!("2022.0")), Some(2022));
        assert_eq!(value_as_year(&json!("n/a")), None);
        assert_eq!(value_as_year(&Value::Null), None);
    }

    #[test]
    fn strings_from_scalars() {
        assert_eq!(value_as_string(&json!("RR")), Some("RR".to_string()));
        assert_eq!(value_as_string(&json!(14)), Some("14".to_string()));
        assert_eq!(value_as_string(&json!([1, 2])), None);
    }

    #[test]
    fn rejects_unrepresentable_years() {
        assert_eq!(normalize_year(f64::NAN), None);
        assert_eq!(normalize_year(1e12), None);
    }
}
