use intentdesk_core::assets::AssetRegistry;
use intentdesk_core::config::GuardrailsConfig;
use rust_decimal::Decimal;

use crate::conversation::AgentCommand;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Checks applied to an interpreted command before anything reaches the
/// orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_swap_amount: Option<Decimal>,
    pub max_deposit_amount: Option<Decimal>,
}

impl From<&GuardrailsConfig> for GuardrailPolicy {
    fn from(config: &GuardrailsConfig) -> Self {
        Self {
            max_swap_amount: config.max_swap_amount,
            max_deposit_amount: config.max_deposit_amount,
        }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, command: &AgentCommand, registry: &AssetRegistry) -> GuardrailDecision {
        match command {
            AgentCommand::Status => GuardrailDecision::Allow,
            AgentCommand::Swap { asset_in, amount, target_token } => {
                if *amount <= Decimal::ZERO {
                    return deny_amount("Invalid swap parameters provided.");
                }
                if let Some(decision) = unknown_asset(registry, &[asset_in, target_token]) {
                    return decision;
                }
                if asset_in.eq_ignore_ascii_case(target_token) {
                    return GuardrailDecision::Deny {
                        reason_code: "same_asset_swap",
                        user_message: format!("Cannot swap {asset_in} to itself."),
                        fallback_path: "choose_different_asset",
                    };
                }
                above_cap(*amount, self.max_swap_amount, "swap")
            }
            AgentCommand::Deposit { asset, amount } => {
                if *amount <= Decimal::ZERO {
                    return deny_amount("Invalid deposit amount provided.");
                }
                if let Some(decision) = unknown_asset(registry, &[asset]) {
                    return decision;
                }
                above_cap(*amount, self.max_deposit_amount, "deposit")
            }
            AgentCommand::Withdraw { asset, amount, .. } => {
                if *amount <= Decimal::ZERO {
                    return deny_amount("Invalid withdraw amount provided.");
                }
                unknown_asset(registry, &[asset]).unwrap_or(GuardrailDecision::Allow)
            }
        }
    }
}

fn deny_amount(message: &str) -> GuardrailDecision {
    GuardrailDecision::Deny {
        reason_code: "non_positive_amount",
        user_message: message.to_string(),
        fallback_path: "provide_positive_amount",
    }
}

fn unknown_asset(registry: &AssetRegistry, symbols: &[&String]) -> Option<GuardrailDecision> {
    let unknown = symbols.iter().find(|symbol| !registry.contains(symbol))?;
    Some(GuardrailDecision::Deny {
        reason_code: "unknown_asset",
        user_message: format!(
            "Unknown token {unknown}. Supported tokens: {}.",
            registry.symbols().join(", ")
        ),
        fallback_path: "choose_supported_asset",
    })
}

fn above_cap(amount: Decimal, cap: Option<Decimal>, action: &str) -> GuardrailDecision {
    match cap {
        Some(cap) if amount > cap => GuardrailDecision::Deny {
            reason_code: "amount_above_cap",
            user_message: format!(
                "The requested {action} of {} exceeds the configured limit of {}.",
                amount.normalize(),
                cap.normalize()
            ),
            fallback_path: "reduce_amount",
        },
        _ => GuardrailDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use intentdesk_core::assets::AssetRegistry;
    use rust_decimal::Decimal;

    use super::{GuardrailDecision, GuardrailPolicy};
    use crate::conversation::AgentCommand;

    fn swap(asset_in: &str, amount: i64, target: &str) -> AgentCommand {
        AgentCommand::Swap {
            asset_in: asset_in.to_string(),
            amount: Decimal::from(amount),
            target_token: target.to_string(),
        }
    }

    fn reason(decision: GuardrailDecision) -> &'static str {
        match decision {
            GuardrailDecision::Deny { reason_code, .. } => reason_code,
            GuardrailDecision::Allow => "allow",
        }
    }

    #[test]
    fn supported_swap_is_allowed() {
        let decision =
            GuardrailPolicy::default().evaluate(&swap("NEAR", 1, "USDC"), &AssetRegistry::default());
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn bad_amounts_tokens_and_pairs_are_denied() {
        let policy = GuardrailPolicy::default();
        let registry = AssetRegistry::default();

        assert_eq!(reason(policy.evaluate(&swap("NEAR", 0, "USDC"), &registry)), "non_positive_amount");
        assert_eq!(reason(policy.evaluate(&swap("NEAR", 1, "DOGE"), &registry)), "unknown_asset");
        assert_eq!(reason(policy.evaluate(&swap("usdc", 1, "USDC"), &registry)), "same_asset_swap");

        let deposit = AgentCommand::Deposit { asset: "NEAR".to_string(), amount: Decimal::from(-2) };
        match policy.evaluate(&deposit, &registry) {
            GuardrailDecision::Deny { user_message, fallback_path, .. } => {
                assert_eq!(user_message, "Invalid deposit amount provided.");
                assert_eq!(fallback_path, "provide_positive_amount");
            }
            GuardrailDecision::Allow => panic!("negative deposit must be denied"),
        }
    }

    #[test]
    fn caps_bound_swaps_and_deposits() {
        let policy = GuardrailPolicy {
            max_swap_amount: Some(Decimal::from(5)),
            max_deposit_amount: Some(Decimal::from(10)),
        };
        let registry = AssetRegistry::default();

        assert_eq!(reason(policy.evaluate(&swap("NEAR", 6, "USDC"), &registry)), "amount_above_cap");
        assert!(policy.evaluate(&swap("NEAR", 5, "USDC"), &registry).is_allowed());
        let deposit = AgentCommand::Deposit { asset: "NEAR".to_string(), amount: Decimal::from(10) };
        assert!(policy.evaluate(&deposit, &registry).is_allowed());
    }
}
