// Utility helpers for cell coercion and number formatting.
//
// This module centralizes the "dirty" CSV number handling so the rest of the
// code can work with typed values.
use num_format::{Locale, ToFormattedString};

/// Outcome of coercing a single cell to a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    Value(f64),
    /// Blank cell: missing data, not a coercion failure.
    Empty,
    Unparseable,
}

/// Coerce a CSV cell into `f64` while being forgiving about formatting issues
/// that are common in statistics exports.
///
/// - Trims whitespace.
/// - Strips thousands separators like `","` before parsing.
/// - Accepts exponent notation (`1.5e6`) but no other letters, so words
///   like `inf` or `NaN` stay unparseable.
pub fn coerce_f64(s: &str) -> Coerced {
    let s = s.trim();
    if s.is_empty() {
        return Coerced::Empty;
    }
    if s
        .chars()
        .any(|c| c.is_ascii_alphabetic() && !c.eq_ignore_ascii_case(&'e'))
    {
        return Coerced::Unparseable;
    }
    let s = s.replace(",", "");
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Coerced::Value(v),
        _ => Coerced::Unparseable,
    }
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // Year columns exported from spreadsheets often come through as `2019.0`.
    s.parse::<i32>()
        .ok()
        .or_else(|| s.strip_suffix(".0").and_then(|t| t.parse::<i32>().ok()))
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Beyond u128 the digits are printed without separators.
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Render a nullable metric, using the dashboard's "no data" marker for null.
pub fn format_optional(n: Option<f64>, decimals: usize) -> String {
    match n {
        Some(v) => format_number(v, decimals),
        None => "no data".to_string(),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_strips_thousands_separators() {
        assert_eq!(coerce_f64(" 1,234.5 "), Coerced::Value(1234.5));
        assert_eq!(coerce_f64(""), Coerced::Empty);
        assert_eq!(coerce_f64("n/a"), Coerced::Unparseable);
        assert_eq!(coerce_f64("--"), Coerced::Unparseable);
    }

    #[test]
    fn coerce_accepts_exponent_notation() {
        assert_eq!(coerce_f64("1.5e6"), Coerced::Value(1_500_000.0));
        assert_eq!(coerce_f64("2E-3"), Coerced::Value(0.002));
        assert_eq!(coerce_f64("e"), Coerced::Unparseable);
        assert_eq!(coerce_f64("1e999"), Coerced::Unparseable);
        assert_eq!(coerce_f64("inf"), Coerced::Unparseable);
        assert_eq!(coerce_f64("NaN"), Coerced::Unparseable);
    }

    #[test]
    fn parse_year_accepts_float_export() {
        assert_eq!(parse_i32_safe(Some("2019")), Some(2019));
        assert_eq!(parse_i32_safe(Some("2019.0")), Some(2019));
        assert_eq!(parse_i32_safe(Some("twenty")), None);
        assert_eq!(parse_i32_safe(None), None);
    }

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-42.0, 0), "-42");
        assert_eq!(format_optional(None, 2), "no data");
    }

    #[test]
    fn format_number_keeps_values_past_i64() {
        assert_eq!(format_number(1e20, 0), "100,000,000,000,000,000,000");
        let huge = format_number(-1e300, 1);
        assert!(huge.starts_with("-1000"));
        assert!(huge.ends_with(".0"));
    }
}
