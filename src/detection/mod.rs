// src/detection/mod.rs
//! Security detectors consumed by the decision pipeline
//!
//! The pipeline only depends on the two traits; the pattern-based
//! implementations here are the built-in defaults.

pub mod injection;
pub mod leakage;

pub use injection::PatternInjectionDetector;
pub use leakage::PatternLeakageDetector;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one detector run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe(String),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Reason for an unsafe verdict, empty when safe
    pub fn reason(&self) -> &str {
        match self {
            Self::Safe => "",
            Self::Unsafe(reason) => reason,
        }
    }
}

/// PII entity families the leakage check can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Crypto,
    CreditCard,
    UsSsn,
    PhoneNumber,
    UsBankNumber,
    EmailAddress,
    IpAddress,
    IbanCode,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        Self::Crypto,
        Self::CreditCard,
        Self::UsSsn,
        Self::PhoneNumber,
        Self::UsBankNumber,
        Self::EmailAddress,
        Self::IpAddress,
        Self::IbanCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "CRYPTO",
            Self::CreditCard => "CREDIT_CARD",
            Self::UsSsn => "US_SSN",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::UsBankNumber => "US_BANK_NUMBER",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::IpAddress => "IP_ADDRESS",
            Self::IbanCode => "IBAN_CODE",
        }
    }

    /// Entities checked when nothing is configured
    pub fn default_allow_list() -> Vec<EntityKind> {
        vec![
            Self::Crypto,
            Self::CreditCard,
            Self::UsSsn,
            Self::PhoneNumber,
            Self::UsBankNumber,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// Secret/PII check over outbound text
///
/// An empty `entities` list means every [`EntityKind`].
pub trait LeakageDetector: Send + Sync {
    fn check(&self, text: &str, entities: &[EntityKind]) -> Verdict;
}

/// Prompt-injection check over response text
pub trait InjectionDetector: Send + Sync {
    fn check(&self, text: &str) -> Verdict;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("PERSON".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_verdict_reason() {
        assert_eq!(Verdict::Safe.reason(), "");
        assert!(!Verdict::Unsafe("x".into()).is_safe());
    }
}
