//! # Utility Functions
//!
//! Small helpers shared across the service.

/// Normalize an IBAN: strip whitespace, uppercase.
pub fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Validate a Saudi IBAN: "SA" followed by exactly 22 digits.
///
/// Expects an already-normalized input.
pub fn is_valid_saudi_iban(iban: &str) -> bool {
    iban.len() == 24
        && iban.starts_with("SA")
        && iban[2..].chars().all(|c| c.is_ascii_digit())
}

/// Mask an IBAN for logs: keep the country code and last 4 digits.
pub fn mask_iban(iban: &str) -> String {
    if iban.len() <= 8 {
        return "****".to_string();
    }
    format!("{}****{}", &iban[..4], &iban[iban.len() - 4..])
}

/// Format a coin amount with its currency equivalent (1 coin = 1 SAR).
pub fn format_coins(amount: i64) -> String {
    format!("{} coins ({} SAR)", amount, amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_iban() {
        assert_eq!(
            normalize_iban("sa03 8000 0000 6080 1016 7519"),
            "SA0380000000608010167519"
        );
        assert_eq!(normalize_iban("  SA12  "), "SA12");
    }

    #[test]
    fn test_valid_saudi_iban() {
        assert!(is_valid_saudi_iban("SA0380000000608010167519"));
    }

    #[test]
    fn test_invalid_ibans() {
        // wrong country
        assert!(!is_valid_saudi_iban("DE89370400440532013000"));
        // too short
        assert!(!is_valid_saudi_iban("SA038000000060801016751"));
        // too long
        assert!(!is_valid_saudi_iban("SA03800000006080101675190"));
        // letters in the digit part
        assert!(!is_valid_saudi_iban("SA03800000006080101675AB"));
        assert!(!is_valid_saudi_iban(""));
    }

    #[test]
    fn test_mask_iban() {
        assert_eq!(
            mask_iban("SA0380000000608010167519"),
            "SA03****7519"
        );
        assert_eq!(mask_iban("SA12"), "****");
    }

    #[test]
    fn test_format_coins() {
        assert_eq!(format_coins(500), "500 coins (500 SAR)");
    }
}
