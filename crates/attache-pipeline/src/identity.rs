// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity validation for transport push-names.
//!
//! Push-names are user-controlled and frequently junk ("iPhone", emoji
//! strings, phone numbers). Only names passing these checks become display
//! names; everything else leaves the contact unnamed so the reply prompt
//! carries the identity-discovery instruction instead.

/// Generic placeholders that are never real names.
const PLACEHOLDERS: &[&str] = &[
    "user", "iphone", "android", "whatsapp", "telegram", "me", "hi", "hello", "test",
    "unknown", "null", "undefined", "admin", "info", "contact", "samsung", "xiaomi",
    "huawei", "new user",
];

/// Whether a push-name is plausible enough to store as a display name.
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }

    let char_count = trimmed.chars().count();
    if !(2..=50).contains(&char_count) {
        return false;
    }

    if PLACEHOLDERS.contains(&trimmed.to_lowercase().as_str()) {
        return false;
    }

    // Emoji-only and symbol-only strings carry no identity.
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    if digits as f64 / char_count as f64 > 0.7 {
        return false;
    }

    let specials = trimmed
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if specials as f64 / char_count as f64 > 0.5 {
        return false;
    }

    true
}

/// Extracts a usable display name from a transport push-name.
pub fn derive_display_name(push_name: Option<&str>) -> Option<String> {
    push_name
        .map(str::trim)
        .filter(|name| is_valid_name(name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert!(is_valid_name("Alice"));
        assert!(is_valid_name("Alice Martin"));
        assert!(is_valid_name("José"));
        assert!(is_valid_name("O'Brien"));
        assert!(is_valid_name("  Sam  "));
    }

    #[test]
    fn rejects_empty_and_length_bounds() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name("A"));
        assert!(!is_valid_name(&"x".repeat(51)));
        assert!(is_valid_name(&"x".repeat(50)));
    }

    #[test]
    fn rejects_placeholders_case_insensitively() {
        assert!(!is_valid_name("user"));
        assert!(!is_valid_name("iPhone"));
        assert!(!is_valid_name("WHATSAPP"));
        assert!(!is_valid_name("Test"));
        assert!(!is_valid_name("hello"));
    }

    #[test]
    fn rejects_emoji_and_symbol_only() {
        assert!(!is_valid_name("😀😀😀"));
        assert!(!is_valid_name("***"));
        assert!(!is_valid_name("---"));
        assert!(!is_valid_name("123456"));
    }

    #[test]
    fn rejects_mostly_digits() {
        // 8 digits out of 10 chars is 0.8 > 0.7.
        assert!(!is_valid_name("ab12345678"));
        // Half digits is fine.
        assert!(is_valid_name("agent 47"));
    }

    #[test]
    fn rejects_mostly_special_chars() {
        assert!(!is_valid_name("a*#!%&?*"));
        assert!(is_valid_name("Anne-Marie"));
    }

    #[test]
    fn derive_returns_trimmed_valid_names_only() {
        assert_eq!(derive_display_name(Some("  Alice ")), Some("Alice".into()));
        assert_eq!(derive_display_name(Some("iPhone")), None);
        assert_eq!(derive_display_name(None), None);
    }
}
