use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Currencies the extractor knows how to recognise. One ledger account
/// exists per currency, created lazily on first detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    RUB,
    USD,
    EUR,
    AED,
    IDR,
}

pub const ALL_CURRENCIES: [Currency; 5] = [
    Currency::RUB,
    Currency::USD,
    Currency::EUR,
    Currency::AED,
    Currency::IDR,
];

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::RUB => "RUB",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::AED => "AED",
            Currency::IDR => "IDR",
        }
    }

    pub fn from_code(code: &str) -> Option<Currency> {
        match code.to_uppercase().as_str() {
            "RUB" => Some(Currency::RUB),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "AED" => Some(Currency::AED),
            "IDR" => Some(Currency::IDR),
            _ => None,
        }
    }

    /// Display name given to the account created for this currency.
    pub fn account_name(&self) -> &'static str {
        match self {
            Currency::RUB => "Российский счет",
            Currency::USD => "Долларовый счет",
            Currency::EUR => "Евро счет",
            Currency::AED => "Дирхамовый счет",
            Currency::IDR => "Рупиевый счет",
        }
    }

    /// Ordered amount-notation patterns for this currency. Each pattern
    /// captures only the numeric portion; symbol/code/localised-word markers
    /// sit outside the capture group. Adding a currency means adding a table
    /// entry here; the extractor never changes.
    pub fn patterns(&self) -> &'static [Regex] {
        match self {
            Currency::RUB => &RUB_PATTERNS,
            Currency::USD => &USD_PATTERNS,
            Currency::EUR => &EUR_PATTERNS,
            Currency::AED => &AED_PATTERNS,
            Currency::IDR => &IDR_PATTERNS,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("invalid currency pattern"))
        .collect()
}

static RUB_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d{1,3}(?:\s\d{3})*(?:,\d{2})?)\s*₽",
        r"(\d{1,3}(?:\s\d{3})*(?:,\d{2})?)\s*Р",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)\s*руб",
        r"(\d{1,3}(?:\s\d{3})*(?:,\d{2})?)\s*рубл",
    ])
});

static USD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)\s*\$",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)\s*USD",
        r"\$(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)",
    ])
});

static EUR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)\s*€",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)\s*EUR",
        r"€(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)",
    ])
});

static AED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)\s*AED",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)\s*дирхам",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{2})?)\s*د\.إ",
    ])
});

static IDR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Rp\s*(\d{1,3}(?:,\d{3})*(?:\.\d{3})?)",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{3})?)\s*Rp",
        r"(\d{1,3}(?:\s\d{3})*(?:\.\d{3})?)\s*рупий",
    ])
});

/// Words that mark a line as balance-ish. A match on such a line is tagged
/// with the keyword for explainability; tagging never affects selection.
pub const BALANCE_KEYWORDS: [&str; 12] = [
    "balance",
    "total",
    "available",
    "current",
    "main",
    "cash",
    "баланс",
    "доступно",
    "основной",
    "текущий",
    "общий",
    "наличные",
];
