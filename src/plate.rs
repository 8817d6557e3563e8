use std::sync::LazyLock;

use regex::Regex;

/// State code, district digits, one or two series letters, four digits.
/// `KA01AB1234`, `KA01A1234`.
const PLATE_PATTERN: &str = r"^[A-Z]{2}[0-9]{2}[A-Z]{1,2}[0-9]{4}$";

static PLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLATE_PATTERN).expect("valid regex"));

/// Whether `plate` is a well-formed vehicle registration number.
pub fn is_valid(plate: &str) -> bool {
    PLATE_RE.is_match(plate)
}

/// Same as [`is_valid`], with a missing plate treated as invalid.
pub fn is_valid_opt(plate: Option<&str>) -> bool {
    plate.is_some_and(is_valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_two_letter_series() {
        assert!(is_valid("KA01AB1234"));
        assert!(is_valid("MH12DE1433"));
    }

    #[test]
    fn accepts_single_letter_series() {
        assert!(is_valid("KA01A1234"));
    }

    #[test]
    fn rejects_lowercase() {
        assert!(!is_valid("ka01ab1234"));
        assert!(!is_valid("KA01ab1234"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid("KA01AB12345"));
        assert!(!is_valid("KA01AB123"));
        assert!(!is_valid("KA01ABC1234"));
        assert!(!is_valid(""));
    }

    #[test]
    fn rejects_misplaced_groups() {
        assert!(!is_valid("K101AB1234"));
        assert!(!is_valid("KAA1AB1234"));
        assert!(!is_valid("KA01121234"));
        assert!(!is_valid(" KA01AB1234"));
        assert!(!is_valid("KA01AB1234\n"));
    }

    #[test]
    fn missing_plate_is_invalid() {
        assert!(!is_valid_opt(None));
        assert!(is_valid_opt(Some("KA01AB1234")));
        assert!(!is_valid_opt(Some("KA01AB12345")));
    }
}
