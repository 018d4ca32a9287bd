//! Ukrainian phone normalization.
//!
//! Every write path that accepts a phone goes through [`normalize_phone`]
//! first, so the `(business_id, phone)` client key is always in canonical
//! `+380XXXXXXXXX` form.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid phone number: {0}")]
pub struct PhoneError(pub String);

/// Normalize a free-form phone string to `+380XXXXXXXXX`.
///
/// Accepted shapes: `0XXXXXXXXX`, `380XXXXXXXXX`, `+380XXXXXXXXX`, with any
/// mix of spaces, dashes, dots and parentheses. Everything else is rejected.
pub fn normalize_phone(raw: &str) -> Result<String, PhoneError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if raw.chars().any(|c| !c.is_ascii_digit() && !matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'))
    {
        return Err(PhoneError(raw.to_string()));
    }

    let national = match digits.len() {
        10 if digits.starts_with('0') => digits[1..].to_string(),
        12 if digits.starts_with("380") => digits[3..].to_string(),
        _ => return Err(PhoneError(raw.to_string())),
    };

    // Mobile and regional codes all start with a non-zero digit.
    if national.len() != 9 || national.starts_with('0') {
        return Err(PhoneError(raw.to_string()));
    }

    Ok(format!("+380{national}"))
}

/// True when the whole message is nothing but a phone number.
pub fn is_phone_only(message: &str) -> bool {
    let trimmed = message.trim();
    !trimmed.is_empty() && normalize_phone(trimmed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{is_phone_only, normalize_phone};

    #[test]
    fn classification_table() {
        let cases: &[(&str, Option<&str>)] = &[
            ("0671234567", Some("+380671234567")),
            ("+380671234567", Some("+380671234567")),
            ("380671234567", Some("+380671234567")),
            ("067 123 45 67", Some("+380671234567")),
            ("(067) 123-45-67", Some("+380671234567")),
            ("+38 067 123 45 67", Some("+380671234567")),
            ("123", None),
            ("+1234", None),
            ("06712345678", None),
            ("0071234567", None),
            ("abc0671234567", None),
            ("", None),
        ];

        for (input, expected) in cases {
            let result = normalize_phone(input);
            match expected {
                Some(canonical) => {
                    assert_eq!(result.as_deref(), Ok(*canonical), "input: {input}")
                }
                None => assert!(result.is_err(), "input should be rejected: {input}"),
            }
        }
    }

    #[test]
    fn phone_only_detection() {
        assert!(is_phone_only(" 0671234567 "));
        assert!(is_phone_only("+380671234567"));
        assert!(!is_phone_only("мій номер 0671234567"));
        assert!(!is_phone_only(""));
    }
}
