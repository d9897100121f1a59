// src/detection/leakage.rs
//! Pattern-based data leakage detector
//!
//! Two passes over the text:
//! 1. Secret assignments (`api_key=...`, `password: ...`, PEM key blocks).
//!    Always on, first hit wins.
//! 2. PII recognizers, restricted to the caller's entity allow-list. All
//!    hits are collected and reported together.
//!
//! Recognizers with a checksum (card numbers, IBANs) only fire when the
//! checksum holds.

use crate::detection::{EntityKind, LeakageDetector, Verdict};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r#"(?i)api[_-]?key\s*[:=]\s*['"]?[a-z0-9_-]{10,}"#, "API key detected"),
        (r#"(?i)secret[_-]?key\s*[:=]\s*['"]?[a-z0-9_-]{10,}"#, "Secret key detected"),
        (r#"(?i)password\s*[:=]\s*['"]?[^\s'"<>]{6,}"#, "Password detected"),
        (r#"(?i)token\s*[:=]\s*['"]?[a-z0-9_-]{20,}"#, "Token detected"),
        (r#"(?i)credential\s*[:=]\s*['"]?[a-z0-9_-]{10,}"#, "Credential detected"),
        (r#"(?i)private[_-]?key\s*[:=]"#, "Private key detected"),
        (r#"(?i)-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----"#, "Private key block detected"),
    ]
    .into_iter()
    .map(|(pattern, what)| (Regex::new(pattern).expect("secret pattern"), what))
    .collect()
});

static BTC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:bc1[a-z0-9]{25,59}|[13][a-km-zA-HJ-NP-Z1-9]{25,34})\b").expect("btc pattern")
});

static ETH_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").expect("eth pattern"));

static CARD_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("card pattern"));

static US_SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})[- ](\d{2})[- ](\d{4})\b").expect("ssn pattern"));

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]\d{4}\b")
        .expect("phone pattern")
});

static US_BANK_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:account|acct|bank|routing)(?:\s+(?:number|num|no\.?|#))?\s*[:#=]?\s*\d{8,17}\b")
        .expect("bank pattern")
});

static EMAIL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern")
});

static IPV4_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ip pattern"));

static IBAN_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b").expect("iban pattern")
});

/// Built-in leakage detector
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternLeakageDetector;

impl PatternLeakageDetector {
    pub fn new() -> Self {
        Self
    }

    fn secret(&self, text: &str) -> Option<&'static str> {
        SECRET_PATTERNS
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, what)| *what)
    }

    fn contains(&self, kind: EntityKind, text: &str) -> bool {
        match kind {
            EntityKind::Crypto => BTC_ADDRESS.is_match(text) || ETH_ADDRESS.is_match(text),
            EntityKind::CreditCard => CARD_CANDIDATE
                .find_iter(text)
                .any(|m| luhn_valid(m.as_str())),
            EntityKind::UsSsn => US_SSN.captures_iter(text).any(|c| {
                valid_ssn(&c[1], &c[2], &c[3])
            }),
            EntityKind::PhoneNumber => PHONE_NUMBER.is_match(text),
            EntityKind::UsBankNumber => US_BANK_NUMBER.is_match(text),
            EntityKind::EmailAddress => EMAIL_ADDRESS.is_match(text),
            EntityKind::IpAddress => IPV4_CANDIDATE
                .find_iter(text)
                .any(|m| m.as_str().parse::<Ipv4Addr>().is_ok()),
            EntityKind::IbanCode => IBAN_CANDIDATE
                .find_iter(text)
                .any(|m| iban_valid(m.as_str())),
        }
    }
}

impl LeakageDetector for PatternLeakageDetector {
    fn check(&self, text: &str, entities: &[EntityKind]) -> Verdict {
        if let Some(what) = self.secret(text) {
            return Verdict::Unsafe(format!("Data leakage detected: {}", what));
        }

        let entities = if entities.is_empty() {
            &EntityKind::ALL[..]
        } else {
            entities
        };
        let found: BTreeSet<&'static str> = entities
            .iter()
            .filter(|kind| self.contains(**kind, text))
            .map(EntityKind::as_str)
            .collect();
        if found.is_empty() {
            return Verdict::Safe;
        }

        let names: Vec<&str> = found.into_iter().collect();
        Verdict::Unsafe(format!("PII detected: {}", names.join(", ")))
    }
}

/// Luhn checksum over the digits of `candidate` (separators ignored)
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(index, digit)| {
            if index % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *digit
            }
        })
        .sum();
    sum % 10 == 0
}

fn valid_ssn(area: &str, group: &str, serial: &str) -> bool {
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

/// ISO 13616 mod-97 check
fn iban_valid(candidate: &str) -> bool {
    let compact: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
    if !(15..=34).contains(&compact.len()) {
        return false;
    }

    let (head, tail) = compact.split_at(4);
    let mut remainder: u32 = 0;
    for c in tail.chars().chain(head.chars()) {
        let value = match c.to_digit(36) {
            Some(value) => value,
            None => return false,
        };
        remainder = if value < 10 {
            (remainder * 10 + value) % 97
        } else {
            (remainder * 100 + value) % 97
        };
    }
    remainder == 1
}
