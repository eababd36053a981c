use intentdesk_core::orchestrator::DepositRequest;
use rust_decimal::Decimal;

use crate::commands::{open_session, operation_context, CommandResult};

pub fn run(asset: String, amount: Decimal) -> CommandResult {
    let session = match open_session("deposit") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let (ctx, _) = operation_context();
    let request = DepositRequest { asset: asset.clone(), amount };

    match session.runtime.block_on(session.orchestrator.deposit(request, &ctx)) {
        Ok(receipt) => CommandResult::success_with(
            "deposit",
            format!(
                "deposited {} {asset} into {}",
                amount.normalize(),
                session.orchestrator.config().verifying_contract
            ),
            &receipt,
        ),
        Err(error) => CommandResult::operation_failure("deposit", &error),
    }
}
