use intentdesk_core::orchestrator::{SwapOutcome, SwapRequest};
use rust_decimal::Decimal;
use serde_json::json;

use crate::commands::{open_session, operation_context, progress_lines, CommandResult};

#[derive(Clone, Debug)]
pub struct SwapArgs {
    pub from: String,
    pub amount: Decimal,
    pub to: String,
    pub amount_out: Option<Decimal>,
}

pub fn run(args: SwapArgs) -> CommandResult {
    let session = match open_session("swap") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let mut request = SwapRequest::new(args.from, args.amount, args.to);
    if let Some(amount_out) = args.amount_out {
        request = request.with_amount_out(amount_out);
    }
    let (ctx, sink) = operation_context();

    match session.runtime.block_on(session.orchestrator.swap(request, &ctx)) {
        Ok(SwapOutcome::Published(receipt)) => CommandResult::success_with(
            "swap",
            format!("intent published using quote {}", receipt.selected.quote_hash),
            &json!({
                "correlation_id": receipt.correlation_id,
                "quote_hash": receipt.selected.quote_hash,
                "amount_out": receipt.selected.amount_out,
                "response": receipt.response,
                "progress": progress_lines(&sink),
            }),
        ),
        Ok(SwapOutcome::Unavailable(unavailable)) => {
            CommandResult::unavailable("swap", &unavailable.reason)
        }
        Err(error) => CommandResult::operation_failure("swap", &error),
    }
}
