//! Spreadsheet formula-injection defense
//!
//! A CSV cell whose first meaningful character is a formula trigger gets an
//! apostrophe prefix, which spreadsheet applications render as a literal.
//! Applied to every exported cell, not just obviously user-controlled ones;
//! even a formatted negative amount starts with `-`.

/// Characters that make a spreadsheet treat a cell as a formula
pub const FORMULA_TRIGGERS: [char; 7] = ['=', '+', '-', '@', '\t', '\r', '\n'];

/// Whether a cell can be exported as-is
pub fn is_safe_cell(value: &str) -> bool {
    match value.trim_start_matches(' ').chars().next() {
        Some(first) => !FORMULA_TRIGGERS.contains(&first),
        None => true,
    }
}

/// Neutralize a cell value for CSV export
pub fn sanitize_cell(value: &str) -> String {
    if is_safe_cell(value) {
        value.to_string()
    } else {
        format!("'{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_untouched() {
        assert_eq!(sanitize_cell("Alice"), "Alice");
        assert_eq!(sanitize_cell("5668.75"), "5668.75");
        assert_eq!(sanitize_cell(""), "");
        assert_eq!(sanitize_cell("E001"), "E001");
    }

    #[test]
    fn test_formula_triggers_prefixed() {
        assert_eq!(sanitize_cell("=SUM(A1:A9)"), "'=SUM(A1:A9)");
        assert_eq!(sanitize_cell("+1234"), "'+1234");
        assert_eq!(sanitize_cell("-150.00"), "'-150.00");
        assert_eq!(sanitize_cell("@cmd"), "'@cmd");
        assert_eq!(sanitize_cell("\tpayload"), "'\tpayload");
    }

    #[test]
    fn test_trigger_behind_leading_spaces_caught() {
        assert_eq!(sanitize_cell("  =1+1"), "'  =1+1");
        assert!(!is_safe_cell("  =1+1"));
    }

    #[test]
    fn test_trigger_mid_cell_is_fine() {
        assert_eq!(sanitize_cell("a=b"), "a=b");
        assert!(is_safe_cell("10-20"));
    }
}
