// src/payment/requirement.rs
//! Payment requirements and selection policies
//!
//! Requirements arrive in x402 form (`payTo`, `maxAmountRequired`, amount as
//! a decimal string). The snake_case spellings used by some clients are
//! accepted as well. Fields this crate does not interpret (`resource`,
//! `maxTimeoutSeconds`, `extra`, ...) are carried through untouched so the
//! wallet sees the requirement exactly as the server sent it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One acceptable way to pay for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Settlement network (e.g. "base-sepolia")
    pub network: String,

    /// Payment scheme (e.g. "exact")
    pub scheme: String,

    /// Recipient address
    #[serde(alias = "pay_to")]
    pub pay_to: String,

    /// Asset identifier (contract address or symbol)
    pub asset: String,

    /// Ceiling in the asset's smallest unit
    #[serde(alias = "max_amount_required", with = "amount")]
    pub max_amount_required: u128,

    /// Uninterpreted protocol fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentRequirement {
    pub fn new(
        network: impl Into<String>,
        scheme: impl Into<String>,
        pay_to: impl Into<String>,
        asset: impl Into<String>,
        max_amount_required: u128,
    ) -> Self {
        Self {
            network: network.into(),
            scheme: scheme.into(),
            pay_to: pay_to.into(),
            asset: asset.into(),
            max_amount_required,
            extra: Map::new(),
        }
    }

    /// Short human description, e.g. "1000 USDC on base-sepolia (exact)"
    pub fn describe(&self) -> String {
        format!(
            "{} {} on {} ({})",
            self.max_amount_required, self.asset, self.network, self.scheme
        )
    }
}

/// Caller-supplied constraints for an explicit payment choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCriteria {
    pub network: String,
    pub scheme: String,
    pub pay_to: String,
    pub asset: String,

    /// Highest amount the caller accepts
    #[serde(with = "amount")]
    pub max_amount_required: u128,
}

impl PaymentCriteria {
    pub fn new(
        network: impl Into<String>,
        scheme: impl Into<String>,
        pay_to: impl Into<String>,
        asset: impl Into<String>,
        max_amount_required: u128,
    ) -> Self {
        Self {
            network: network.into(),
            scheme: scheme.into(),
            pay_to: pay_to.into(),
            asset: asset.into(),
            max_amount_required,
        }
    }

    /// Criteria that match exactly this requirement
    pub fn for_requirement(requirement: &PaymentRequirement) -> Self {
        Self::new(
            &requirement.network,
            &requirement.scheme,
            &requirement.pay_to,
            &requirement.asset,
            requirement.max_amount_required,
        )
    }
}

/// How the client chooses among the requirements of a 402
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaymentPolicy {
    /// The wallet picks any requirement it can satisfy
    #[default]
    Auto,

    /// Only requirements matching these criteria are acceptable
    Explicit(PaymentCriteria),

    /// Never pay automatically; the caller reviews the offer and picks one
    Review,
}

/// Amounts travel as decimal strings but numbers are tolerated
pub(crate) mod amount {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text
                .trim()
                .parse::<u128>()
                .map_err(|_| D::Error::custom(format!("invalid amount: {:?}", text))),
            Raw::Number(number) => Ok(u128::from(number)),
        }
    }
}
