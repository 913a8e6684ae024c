//! "N+ years of experience" counters.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

static YEARS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+\+?").ok());

pub fn years_of_experience(start_year: i32, current_year: i32) -> i32 {
    current_year - start_year
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// Replace the first number (with optional `+`) in `text` by `years+`.
pub fn update_experience_text(text: &str, years: i32) -> String {
    match YEARS.as_ref() {
        Some(re) => re.replace(text, format!("{years}+")).into_owned(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_years() {
        assert_eq!(years_of_experience(2015, 2026), 11);
        assert!(years_of_experience(2015, current_year()) >= 10);
    }

    #[test]
    fn test_replaces_first_number_only() {
        assert_eq!(
            update_experience_text("Over 8+ years, 3 countries", 11),
            "Over 11+ years, 3 countries"
        );
        assert_eq!(update_experience_text("5 years", 11), "11+ years");
        assert_eq!(update_experience_text("no digits", 11), "no digits");
    }
}
