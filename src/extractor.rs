use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::currency::{ALL_CURRENCIES, BALANCE_KEYWORDS, Currency};

/// One (amount, currency) pair pulled out of a recognised text line, before
/// selection of the main balance.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    /// Normalised numeric string, e.g. "250288.30".
    pub value: String,
    /// Parsed form of `value`, used for selection.
    pub parsed: f64,
    pub currency: Currency,
    /// The raw OCR line the value came from, kept for audit.
    pub source_line: String,
    /// Balance-ish keyword found on the source line, if any. Explanatory
    /// only; selection ignores it.
    pub keyword: Option<&'static str>,
    /// True when locale correction superseded the naive normalisation.
    pub corrected: bool,
}

// "250 288,30" — space-grouped thousands, comma before exactly two decimal
// digits. Naive separator stripping would read this as 25028830.
static RU_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\s\d{3})*),(\d{2})").expect("invalid locale pattern"));

/// Re-derive a RUB amount from its source line using the Russian number
/// convention. Returns None when the line does not carry a comma-decimal.
fn fix_russian_number_format(line: &str, currency: Currency) -> Option<String> {
    if currency != Currency::RUB {
        return None;
    }
    let caps = RU_DECIMAL.captures(line)?;
    let whole: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    let corrected = format!("{}.{}", whole, &caps[2]);
    corrected.parse::<f64>().ok()?;
    Some(corrected)
}

/// Strip grouping separators from a raw regex capture. Matches that still do
/// not parse as a number are dropped by the caller.
fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace() && *c != ',').collect()
}

/// Scan recognised text lines against every currency's pattern table and
/// return all valid candidates in encounter order.
pub fn extract(lines: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for line in lines {
        let line_lower = line.to_lowercase();
        let keyword = BALANCE_KEYWORDS
            .iter()
            .find(|kw| line_lower.contains(*kw))
            .copied();

        for currency in ALL_CURRENCIES {
            for pattern in currency.patterns() {
                for caps in pattern.captures_iter(line) {
                    let raw = match caps.get(1) {
                        Some(m) => m.as_str(),
                        None => continue,
                    };
                    let value = normalize(raw);
                    let Ok(parsed) = value.parse::<f64>() else {
                        // Bad capture; other candidates may still succeed.
                        continue;
                    };
                    let mut candidate = Candidate {
                        value,
                        parsed,
                        currency,
                        source_line: line.clone(),
                        keyword,
                        corrected: false,
                    };
                    if let Some(corrected) = fix_russian_number_format(line, currency) {
                        if let Ok(parsed) = corrected.parse::<f64>() {
                            candidate.value = corrected;
                            candidate.parsed = parsed;
                            candidate.corrected = true;
                        }
                    }
                    candidates.push(candidate);
                }
            }
        }
    }

    candidates
}

/// The main balance is the candidate with the numerically largest parsed
/// value, ties broken by encounter order. Selection happens before currency
/// conversion, so a large IDR figure beats a small USD one.
pub fn select_main(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.parsed <= current.parsed => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rub_locale_correction() {
        let candidates = extract(&lines(&["250 288,30 ₽"]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "250288.30");
        assert_eq!(candidates[0].parsed, 250288.30);
        assert_eq!(candidates[0].currency, Currency::RUB);
        assert!(candidates[0].corrected);
    }

    #[test]
    fn test_usd_round_trip() {
        let candidates = extract(&lines(&["$1,234.56 available"]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "1234.56");
        assert_eq!(candidates[0].currency, Currency::USD);
        assert_eq!(candidates[0].keyword, Some("available"));
        assert!(!candidates[0].corrected);
    }

    #[test]
    fn test_keyword_tagged_from_localized_line() {
        let candidates = extract(&lines(&["Баланс: 123 456,78 ₽"]));
        assert_eq!(candidates[0].value, "123456.78");
        assert_eq!(candidates[0].keyword, Some("баланс"));
    }

    #[test]
    fn test_no_keyword_on_plain_line() {
        let candidates = extract(&lines(&["500.00 EUR"]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].keyword, None);
        assert_eq!(candidates[0].value, "500.00");
    }

    #[test]
    fn test_selection_prefers_largest_pre_conversion() {
        let candidates = extract(&lines(&["12.50 $", "Rp 900,000"]));
        assert_eq!(candidates.len(), 2);
        let main = select_main(&candidates).unwrap();
        assert_eq!(main.currency, Currency::IDR);
        assert_eq!(main.parsed, 900000.0);
    }

    #[test]
    fn test_selection_tie_keeps_first() {
        let candidates = extract(&lines(&["100.00 $", "100.00 EUR"]));
        let main = select_main(&candidates).unwrap();
        assert_eq!(main.currency, Currency::USD);
    }

    #[test]
    fn test_no_candidates_on_unrelated_text() {
        let candidates = extract(&lines(&["Добрый день", "settings", ""]));
        assert!(candidates.is_empty());
        assert!(select_main(&candidates).is_none());
    }

    #[test]
    fn test_multiple_currencies_on_one_screenshot() {
        let candidates = extract(&lines(&["Баланс:", "250 288,30 ₽", "105.20 $"]));
        assert_eq!(candidates.len(), 2);
        let main = select_main(&candidates).unwrap();
        assert_eq!(main.currency, Currency::RUB);
        assert_eq!(main.value, "250288.30");
    }

    #[test]
    fn test_rub_without_decimal_part_not_corrected() {
        let candidates = extract(&lines(&["15 000 ₽"]));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "15000");
        assert!(!candidates[0].corrected);
    }
}
