//! Phone number normalization.
//!
//! Matching against the VIP directory and the auto-press rate limiter is
//! always on the last ten digits; the last four are the only digits the
//! assistant may confirm aloud.

/// Last ten digits of `raw`, ignoring all non-digit characters.
/// Empty when `raw` contains no digits.
pub fn normalize_last10(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let skip = digits.len().saturating_sub(10);
    digits[skip..].iter().collect()
}

/// Last four digits of `raw`, empty when it has no digits.
pub fn last4(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let skip = digits.len().saturating_sub(4);
    digits[skip..].iter().collect()
}

/// Normalize a dialable number to E.164, defaulting to US (+1).
///
/// Returns `None` when the input doesn't look like a dialable number.
pub fn to_e164_us(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        12..=15 if raw.trim_start().starts_with('+') => Some(format!("+{digits}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last10_strips_punctuation_and_country_code() {
        assert_eq!(normalize_last10("+1 (555) 123-5680"), "5551235680");
        assert_eq!(normalize_last10("5551235680"), "5551235680");
        assert_eq!(normalize_last10("123"), "123");
        assert_eq!(normalize_last10("no digits"), "");
    }

    #[test]
    fn last4_of_short_input() {
        assert_eq!(last4("+15551235680"), "5680");
        assert_eq!(last4("12"), "12");
        assert_eq!(last4(""), "");
    }

    #[test]
    fn e164_us_default() {
        assert_eq!(to_e164_us("5551235680").as_deref(), Some("+15551235680"));
        assert_eq!(to_e164_us("(555) 123-5680").as_deref(), Some("+15551235680"));
        assert_eq!(to_e164_us("15551235680").as_deref(), Some("+15551235680"));
        assert_eq!(to_e164_us("+445551235680").as_deref(), Some("+445551235680"));
        assert_eq!(to_e164_us("12345"), None);
    }
}
