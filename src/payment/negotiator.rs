// src/payment/negotiator.rs
//! Payment negotiation state machine
//!
//! ```text
//! Initial ──402──► AwaitingRequirements ──select──► Selected ──retry ok──► Retried
//!                           │                          │
//!                           └──no match──► Failed ◄────┘ (second 402 / no proof)
//! ```
//!
//! Under the review policy the caller picks the requirement itself and
//! enters at `Selected` through [`Negotiator::on_requirement_chosen`].
//!
//! Explicit selection is deterministic: the first requirement (in the order
//! the server listed them) matching network, scheme, recipient and asset
//! within the ceiling; failing that, and only if the scheme fallback is
//! enabled, the first one matching without the scheme constraint.

use crate::payment::requirement::{PaymentCriteria, PaymentPolicy, PaymentRequirement};
use crate::payment::wallet::{PaymentProof, Wallet};
use crate::utils::errors::{FirewallError, Result};
use tracing::{debug, info, warn};

/// Reason reported when no requirement fits explicit criteria
pub const NO_MATCHING_REQUIREMENT: &str =
    "no matching payment requirements found for the selected criteria";

/// Negotiation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatorConfig {
    /// Fall back to ignoring the scheme when no exact match exists
    pub allow_scheme_fallback: bool,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            allow_scheme_fallback: true,
        }
    }
}

/// Negotiation progress for one `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Initial,
    AwaitingRequirements,
    Selected,
    Retried,
    Failed,
}

/// First requirement satisfying `criteria`
pub fn select_requirement<'a>(
    accepts: &'a [PaymentRequirement],
    criteria: &PaymentCriteria,
    allow_scheme_fallback: bool,
) -> Option<&'a PaymentRequirement> {
    let base_match = |requirement: &PaymentRequirement| {
        requirement.network == criteria.network
            && requirement.pay_to == criteria.pay_to
            && requirement.asset == criteria.asset
            && requirement.max_amount_required <= criteria.max_amount_required
    };

    accepts
        .iter()
        .find(|requirement| base_match(*requirement) && requirement.scheme == criteria.scheme)
        .or_else(|| {
            if allow_scheme_fallback {
                accepts.iter().find(|requirement| base_match(*requirement))
            } else {
                None
            }
        })
}

/// Drives one payment negotiation
#[derive(Debug)]
pub struct Negotiator {
    policy: PaymentPolicy,
    config: NegotiatorConfig,
    state: NegotiationState,
    selected: Option<PaymentRequirement>,
}

impl Negotiator {
    pub fn new(policy: PaymentPolicy, config: NegotiatorConfig) -> Self {
        Self {
            policy,
            config,
            state: NegotiationState::Initial,
            selected: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// Requirement chosen in the `Selected` state
    pub fn selected(&self) -> Option<&PaymentRequirement> {
        self.selected.as_ref()
    }

    /// Handle a 402: choose a requirement and obtain a proof for it
    pub fn on_payment_required(
        &mut self,
        accepts: &[PaymentRequirement],
        wallet: Option<&dyn Wallet>,
    ) -> Result<(PaymentRequirement, PaymentProof)> {
        if self.state != NegotiationState::Initial {
            return self.fail(format!(
                "payment required again in state {:?}",
                self.state
            ));
        }
        self.state = NegotiationState::AwaitingRequirements;
        debug!("Payment required, {} requirement(s) offered", accepts.len());

        let Some(wallet) = wallet else {
            return self.fail("no wallet configured to pay for this request".to_string());
        };

        let chosen = match &self.policy {
            PaymentPolicy::Explicit(criteria) => {
                select_requirement(accepts, criteria, self.config.allow_scheme_fallback)
                    .cloned()
                    .ok_or_else(|| NO_MATCHING_REQUIREMENT.to_string())
            }
            PaymentPolicy::Auto => wallet
                .choose(accepts)
                .cloned()
                .ok_or_else(|| "wallet cannot satisfy any offered payment requirement".to_string()),
            PaymentPolicy::Review => Err("payment requires a requirement chosen by the caller".to_string()),
        };

        match chosen {
            Ok(requirement) => self.sign(requirement, wallet),
            Err(reason) => self.fail(reason),
        }
    }

    /// Pay for a requirement the caller picked from an earlier 402
    ///
    /// The choice still has to satisfy an explicit policy and be payable by
    /// the wallet.
    pub fn on_requirement_chosen(
        &mut self,
        requirement: &PaymentRequirement,
        wallet: Option<&dyn Wallet>,
    ) -> Result<(PaymentRequirement, PaymentProof)> {
        if self.state != NegotiationState::Initial {
            return self.fail(format!("requirement chosen in state {:?}", self.state));
        }
        self.state = NegotiationState::AwaitingRequirements;

        let Some(wallet) = wallet else {
            return self.fail("no wallet configured to pay for this request".to_string());
        };
        if let PaymentPolicy::Explicit(criteria) = &self.policy {
            let offered = std::slice::from_ref(requirement);
            if select_requirement(offered, criteria, self.config.allow_scheme_fallback).is_none() {
                return self.fail(NO_MATCHING_REQUIREMENT.to_string());
            }
        }
        if !wallet.supports(requirement) {
            return self.fail(format!("wallet cannot pay {}", requirement.describe()));
        }
        self.sign(requirement.clone(), wallet)
    }

    fn sign(
        &mut self,
        requirement: PaymentRequirement,
        wallet: &dyn Wallet,
    ) -> Result<(PaymentRequirement, PaymentProof)> {
        let proof = match wallet.produce_proof(&requirement) {
            Ok(proof) => proof,
            Err(err) => return self.fail(format!("wallet could not sign payment: {}", err)),
        };

        info!(
            "Selected payment requirement {} for signer {}",
            requirement.describe(),
            wallet.signer()
        );
        self.state = NegotiationState::Selected;
        self.selected = Some(requirement.clone());
        Ok((requirement, proof))
    }

    /// Record the outcome of the single retry
    pub fn on_retry_reply(&mut self, payment_required_again: bool) -> Result<()> {
        if self.state != NegotiationState::Selected {
            return self.fail(format!("retry reply in state {:?}", self.state));
        }
        if payment_required_again {
            return self.fail("payment was not accepted: retried request still requires payment".to_string());
        }
        self.state = NegotiationState::Retried;
        Ok(())
    }

    fn fail<T>(&mut self, reason: String) -> Result<T> {
        warn!("Payment negotiation failed: {}", reason);
        self.state = NegotiationState::Failed;
        Err(FirewallError::PaymentNegotiation(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticWallet;
    use proptest::prelude::*;

    fn req(network: &str, scheme: &str, pay_to: &str, asset: &str, amount: u128) -> PaymentRequirement {
        PaymentRequirement::new(network, scheme, pay_to, asset, amount)
    }

    fn explicit(amount: u128) -> PaymentPolicy {
        PaymentPolicy::Explicit(PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", amount))
    }

    #[test]
    fn test_exact_match_wins_over_earlier_relaxed_match() {
        let accepts = vec![
            req("base-sepolia", "upto", "0xA", "USDC", 100),
            req("base-sepolia", "exact", "0xA", "USDC", 900),
        ];
        let criteria = PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", 1000);
        let chosen = select_requirement(&accepts, &criteria, true).unwrap();
        assert_eq!(chosen.scheme, "exact");
    }

    #[test]
    fn test_relaxed_match_when_no_exact() {
        let accepts = vec![
            req("base", "exact", "0xA", "USDC", 10),
            req("base-sepolia", "upto", "0xA", "USDC", 100),
            req("base-sepolia", "stream", "0xA", "USDC", 50),
        ];
        let criteria = PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", 1000);
        assert_eq!(
            select_requirement(&accepts, &criteria, true).unwrap().scheme,
            "upto"
        );
        assert!(select_requirement(&accepts, &criteria, false).is_none());
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];
        let at = PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", 1000);
        let below = PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", 999);
        assert!(select_requirement(&accepts, &at, true).is_some());
        assert!(select_requirement(&accepts, &below, true).is_none());
    }

    #[test]
    fn test_explicit_selection_reaches_selected() {
        let wallet = StaticWallet::any();
        let mut negotiator = Negotiator::new(explicit(2000), NegotiatorConfig::default());
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];

        let (chosen, proof) = negotiator.on_payment_required(&accepts, Some(&wallet)).unwrap();
        assert_eq!(chosen, accepts[0]);
        assert_eq!(proof.as_str(), "proof:base-sepolia:exact:0xA:USDC:1000");
        assert_eq!(negotiator.state(), NegotiationState::Selected);

        negotiator.on_retry_reply(false).unwrap();
        assert_eq!(negotiator.state(), NegotiationState::Retried);
    }

    #[test]
    fn test_no_match_fails_with_reason() {
        let wallet = StaticWallet::any();
        let mut negotiator = Negotiator::new(explicit(10), NegotiatorConfig::default());
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];

        let err = negotiator.on_payment_required(&accepts, Some(&wallet)).unwrap_err();
        assert!(err.to_string().contains(NO_MATCHING_REQUIREMENT));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_auto_delegates_to_wallet() {
        let wallet = StaticWallet::on_networks(&["base"]);
        let mut negotiator = Negotiator::new(PaymentPolicy::Auto, NegotiatorConfig::default());
        let accepts = vec![
            req("solana", "exact", "S", "USDC", 1),
            req("base", "exact", "0xB", "USDC", 2),
        ];
        let (chosen, _) = negotiator.on_payment_required(&accepts, Some(&wallet)).unwrap();
        assert_eq!(chosen.network, "base");

        let mut negotiator = Negotiator::new(PaymentPolicy::Auto, NegotiatorConfig::default());
        let unpayable = vec![req("solana", "exact", "S", "USDC", 1)];
        assert!(negotiator.on_payment_required(&unpayable, Some(&wallet)).is_err());
        assert_eq!(negotiator.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_wallet_signing_failure_fails() {
        let wallet = StaticWallet::failing();
        let mut negotiator = Negotiator::new(explicit(2000), NegotiatorConfig::default());
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];
        let err = negotiator.on_payment_required(&accepts, Some(&wallet)).unwrap_err();
        assert!(err.is_payment_failure());
    }

    #[test]
    fn test_missing_wallet_fails() {
        let mut negotiator = Negotiator::new(PaymentPolicy::Auto, NegotiatorConfig::default());
        let accepts = vec![req("base", "exact", "0xB", "USDC", 2)];
        assert!(negotiator.on_payment_required(&accepts, None).is_err());
    }

    #[test]
    fn test_second_402_is_terminal() {
        let wallet = StaticWallet::any();
        let mut negotiator = Negotiator::new(explicit(2000), NegotiatorConfig::default());
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];
        negotiator.on_payment_required(&accepts, Some(&wallet)).unwrap();

        assert!(negotiator.on_retry_reply(true).is_err());
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        // no way back into selection from a terminal state
        assert!(negotiator.on_payment_required(&accepts, Some(&wallet)).is_err());
    }

    #[test]
    fn test_review_policy_never_selects_on_its_own() {
        let wallet = StaticWallet::any();
        let mut negotiator = Negotiator::new(PaymentPolicy::Review, NegotiatorConfig::default());
        let accepts = vec![req("base-sepolia", "exact", "0xA", "USDC", 1000)];
        assert!(negotiator.on_payment_required(&accepts, Some(&wallet)).is_err());
        assert_eq!(negotiator.state(), NegotiationState::Failed);
    }

    #[test]
    fn test_caller_choice_is_signed() {
        let wallet = StaticWallet::any();
        let chosen = req("base", "exact", "0xB", "USDC", 5);
        let mut negotiator = Negotiator::new(PaymentPolicy::Review, NegotiatorConfig::default());

        let (requirement, proof) = negotiator.on_requirement_chosen(&chosen, Some(&wallet)).unwrap();
        assert_eq!(requirement, chosen);
        assert_eq!(proof.as_str(), "proof:base:exact:0xB:USDC:5");
        assert_eq!(negotiator.state(), NegotiationState::Selected);
        assert_eq!(negotiator.selected(), Some(&chosen));
    }

    #[test]
    fn test_caller_choice_still_bound_by_explicit_ceiling() {
        let wallet = StaticWallet::any();
        let mut negotiator = Negotiator::new(explicit(500), NegotiatorConfig::default());
        let over = req("base-sepolia", "exact", "0xA", "USDC", 1000);
        let err = negotiator.on_requirement_chosen(&over, Some(&wallet)).unwrap_err();
        assert!(err.to_string().contains(NO_MATCHING_REQUIREMENT));
    }

    #[test]
    fn test_caller_choice_must_be_payable() {
        let wallet = StaticWallet::on_networks(&["base"]);
        let mut negotiator = Negotiator::new(PaymentPolicy::Review, NegotiatorConfig::default());
        let solana = req("solana", "exact", "S", "USDC", 1);
        assert!(negotiator.on_requirement_chosen(&solana, Some(&wallet)).is_err());

        let mut negotiator = Negotiator::new(PaymentPolicy::Review, NegotiatorConfig::default());
        assert!(negotiator.on_requirement_chosen(&solana, None).is_err());
    }

    fn arb_requirement() -> impl Strategy<Value = PaymentRequirement> {
        (
            prop::sample::select(vec!["base", "base-sepolia"]),
            prop::sample::select(vec!["exact", "upto"]),
            prop::sample::select(vec!["0xA", "0xB"]),
            prop::sample::select(vec!["USDC", "EURC"]),
            0u128..3000,
        )
            .prop_map(|(n, s, p, a, amt)| req(n, s, p, a, amt))
    }

    proptest! {
        #[test]
        fn prop_selection_is_deterministic(
            accepts in prop::collection::vec(arb_requirement(), 0..12),
            ceiling in 0u128..3000,
            fallback in any::<bool>(),
        ) {
            let criteria = PaymentCriteria::new("base-sepolia", "exact", "0xA", "USDC", ceiling);
            let first = select_requirement(&accepts, &criteria, fallback).cloned();
            for _ in 0..3 {
                prop_assert_eq!(select_requirement(&accepts, &criteria, fallback).cloned(), first.clone());
            }

            if let Some(chosen) = first {
                prop_assert!(chosen.max_amount_required <= ceiling);
                let exact_exists = accepts.iter().any(|r| r.scheme == "exact"
                    && r.network == "base-sepolia" && r.pay_to == "0xA"
                    && r.asset == "USDC" && r.max_amount_required <= ceiling);
                if exact_exists {
                    prop_assert_eq!(chosen.scheme.as_str(), "exact");
                }
            }
        }
    }
}
