use intentdesk_core::orchestrator::{SettlementRoute, WithdrawDestination, WithdrawRequest};
use rust_decimal::Decimal;

use crate::commands::{open_session, operation_context, CommandResult};

#[derive(Clone, Debug)]
pub struct WithdrawArgs {
    pub asset: String,
    pub amount: Decimal,
    pub receiver: String,
    /// Foreign network name; `None` or `near` keeps the funds on NEAR.
    pub network: Option<String>,
    pub on_chain: bool,
}

impl WithdrawArgs {
    fn into_request(self) -> WithdrawRequest {
        let destination = WithdrawDestination::for_network(self.receiver, self.network);
        let route = if self.on_chain { SettlementRoute::OnChain } else { SettlementRoute::SolverBus };
        WithdrawRequest { asset: self.asset, amount: self.amount, destination, route }
    }
}

pub fn run(args: WithdrawArgs) -> CommandResult {
    let session = match open_session("withdraw") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let (ctx, _) = operation_context();

    match session.runtime.block_on(session.orchestrator.withdraw(args.into_request(), &ctx)) {
        Ok(receipt) => CommandResult::success_with(
            "withdraw",
            format!("withdrawal settled via {}", receipt.route.as_str()),
            &receipt,
        ),
        Err(error) => CommandResult::operation_failure("withdraw", &error),
    }
}

#[cfg(test)]
mod tests {
    use intentdesk_core::orchestrator::{SettlementRoute, WithdrawDestination};
    use rust_decimal::Decimal;

    use super::WithdrawArgs;

    #[test]
    fn network_flag_selects_foreign_destination() {
        let request = WithdrawArgs {
            asset: "USDC".to_string(),
            amount: Decimal::from(5),
            receiver: "0xabc".to_string(),
            network: Some("eth".to_string()),
            on_chain: true,
        }
        .into_request();

        let expected =
            WithdrawDestination::Foreign { network: "eth".to_string(), address: "0xabc".to_string() };
        assert_eq!(request.destination, expected);
        assert_eq!(request.route, SettlementRoute::OnChain);
    }

    #[test]
    fn near_network_flag_stays_on_near() {
        let request = WithdrawArgs {
            asset: "NEAR".to_string(),
            amount: Decimal::from(1),
            receiver: "bob.near".to_string(),
            network: Some("NEAR".to_string()),
            on_chain: false,
        }
        .into_request();

        assert_eq!(
            request.destination,
            WithdrawDestination::Near { receiver_id: "bob.near".to_string() }
        );
        assert_eq!(request.route, SettlementRoute::SolverBus);
    }
}
