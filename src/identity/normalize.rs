//! Text, national id and email normalization.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::model::Country;

/// Strip diacritics, trim, and lowercase. `"Zúñiga "` becomes `"zuniga"`.
pub fn normalize_text(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Canonical form of a national id: trimmed and uppercased, delimiters kept.
pub fn normalize_national_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

struct IdPattern {
    exact: Regex,
    search: Regex,
}

impl IdPattern {
    fn new(body: &str) -> Self {
        Self {
            exact: Regex::new(&format!("^(?:{body})$")).expect("static id pattern"),
            search: Regex::new(&format!(r"(?i)\b(?:{body})\b")).expect("static id pattern"),
        }
    }
}

fn pattern_body(country: Country) -> &'static str {
    match country {
        // YYMMDD-XXXX or YYYYMMDD-XXXX
        Country::Sweden => r"(?:[0-9]{6}|[0-9]{8})-?[0-9]{4}",
        // DDMMYY-XXXX
        Country::Denmark => r"[0-9]{6}-?[0-9]{4}",
        Country::Norway => r"[0-9]{11}",
        // DDMMYY[-+A]XXXX
        Country::Finland => r"[0-9]{6}[-+A][0-9A-Z]{4}",
    }
}

static ID_PATTERNS: LazyLock<[IdPattern; 4]> =
    LazyLock::new(|| Country::ALL.map(|c| IdPattern::new(pattern_body(c))));

fn id_pattern(country: Country) -> &'static IdPattern {
    &ID_PATTERNS[country.index()]
}

/// Whether an already-normalized national id has the country's format.
pub fn is_valid_national_id(country: Country, national_id: &str) -> bool {
    id_pattern(country).exact.is_match(national_id)
}

/// First national id of the country's format found inside free text.
pub fn find_national_id(country: Country, text: &str) -> Option<String> {
    id_pattern(country)
        .search
        .find(text)
        .map(|m| normalize_national_id(m.as_str()))
}

/// Derive a customer email `first.last@domain` from registry names.
///
/// Names are normalized, spaces dropped, and anything outside `[a-z0-9.@]`
/// removed.
pub fn derive_email(first_name: &str, last_name: &str, domain: &str) -> String {
    let first = normalize_text(first_name).replace(' ', "");
    let last = normalize_text(last_name).replace(' ', "");
    format!("{first}.{last}@{domain}")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '@')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_accents() {
        assert_eq!(normalize_text("  Zúñiga Hidalgo "), "zuniga hidalgo");
        assert_eq!(normalize_text("Västra"), "vastra");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn swedish_formats() {
        assert!(is_valid_national_id(Country::Sweden, "19800101-1230"));
        assert!(is_valid_national_id(Country::Sweden, "860714-1556"));
        assert!(is_valid_national_id(Country::Sweden, "8607141556"));
        assert!(!is_valid_national_id(Country::Sweden, "1980-01-01"));
    }

    #[test]
    fn other_country_formats() {
        assert!(is_valid_national_id(Country::Denmark, "160778-1234"));
        assert!(!is_valid_national_id(Country::Denmark, "16077-1234"));
        assert!(is_valid_national_id(Country::Norway, "47010112345"));
        assert!(!is_valid_national_id(Country::Norway, "4701011234"));
        assert!(is_valid_national_id(Country::Finland, "120394-123X"));
        assert!(is_valid_national_id(Country::Finland, "010100A123B"));
        assert!(!is_valid_national_id(Country::Finland, "120394*123X"));
    }

    #[test]
    fn non_ascii_digits_are_rejected() {
        // Full-width and Arabic-Indic digits.
        assert!(!is_valid_national_id(Country::Norway, "４７０１０１１２３４５"));
        assert!(!is_valid_national_id(Country::Norway, "٤٧٠١٠١١٢٣٤٥"));
        assert!(!is_valid_national_id(Country::Denmark, "١٦٠٧٧٨-1234"));
        assert!(find_national_id(Country::Norway, "id ４７０１０１１２３４５").is_none());
    }

    #[test]
    fn exact_match_is_anchored() {
        assert!(!is_valid_national_id(Country::Norway, "x47010112345"));
        assert!(!is_valid_national_id(Country::Denmark, "160778-12345"));
    }

    #[test]
    fn find_national_id_in_text() {
        let text = "PERSONNUMMER 19800101-1230 SVERIGE";
        assert_eq!(
            find_national_id(Country::Sweden, text).as_deref(),
            Some("19800101-1230")
        );
        assert_eq!(
            find_national_id(Country::Finland, "hetu: 120394-123x").as_deref(),
            Some("120394-123X")
        );
        assert!(find_national_id(Country::Norway, "no digits here").is_none());
    }

    #[test]
    fn derived_email_is_ascii() {
        assert_eq!(
            derive_email("Juan Pablo Rafael", "Zúñiga Hidalgo", "example.com"),
            "juanpablorafael.zunigahidalgo@example.com"
        );
        assert_eq!(
            derive_email("Anna", "O'Svensson", "bank.example"),
            "anna.osvensson@bank.example"
        );
    }

    #[test]
    fn normalize_national_id_uppercases() {
        assert_eq!(normalize_national_id(" 120394-123x "), "120394-123X");
    }
}
