//! Utility functions for request fields and names

use serde_json::Value;

/// Split a comma-delimited entity field into trimmed, non-empty names.
/// The second value is true when the caller sent a list (any comma).
pub fn split_entities(raw: &str) -> (Vec<String>, bool) {
    let multi = raw.contains(',');
    let names = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    (names, multi)
}

/// Upstream spelling of a district name.
///
/// Some district names arrive suffixed with their state
/// ("Mumbai Suburban Maharashtra"); upstream expects the bare, title-cased
/// district in that case.
pub fn upstream_district_name(district: &str, state: &str) -> String {
    let lower_district = district.to_lowercase();
    let lower_state = state.trim().to_lowercase();

    if lower_state.is_empty() || !lower_district.ends_with(&lower_state) {
        return district.to_string();
    }

    let cleaned = lower_district.replace(&lower_state, "");
    title_case(cleaned.trim())
}

/// Capitalize the first letter of every alphabetic run
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Make a name safe to embed in a download filename
pub fn filename_component(name: &str) -> String {
    name.trim().replace([' ', '/'], "_")
}

/// Interpret a loosely typed boolean field ("true", "1", "on", true, 1)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_entities() {
        assert_eq!(split_entities("Pune"), (vec!["Pune".to_string()], false));
        assert_eq!(
            split_entities("Pune, Nashik,,"),
            (vec!["Pune".to_string(), "Nashik".to_string()], true)
        );
        assert_eq!(split_entities("  "), (Vec::new(), false));
    }

    #[test]
    fn test_upstream_district_name() {
        assert_eq!(
            upstream_district_name("MUMBAI SUBURBAN MAHARASHTRA", "Maharashtra"),
            "Mumbai Suburban"
        );
        assert_eq!(upstream_district_name("Pune", "Maharashtra"), "Pune");
        assert_eq!(upstream_district_name("Pune", ""), "Pune");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("north goa"), "North Goa");
        assert_eq!(title_case("y.s.r. kadapa"), "Y.S.R. Kadapa");
    }

    #[test]
    fn test_filename_component() {
        assert_eq!(filename_component("Ground Water Level"), "Ground_Water_Level");
        assert_eq!(filename_component("Rainfall/Daily"), "Rainfall_Daily");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("ON")));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!(null)));
    }
}
