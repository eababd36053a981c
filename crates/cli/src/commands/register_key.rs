use crate::commands::{open_session, operation_context, CommandResult};

pub fn run() -> CommandResult {
    let session = match open_session("register-key") {
        Ok(session) => session,
        Err(result) => return result,
    };
    let (ctx, _) = operation_context();

    match session.runtime.block_on(session.orchestrator.register_public_key(&ctx)) {
        Ok(outcome) => CommandResult::success(
            "register-key",
            format!(
                "public key for {} is registered ({})",
                session.orchestrator.account_id(),
                outcome.as_str()
            ),
        ),
        Err(error) => CommandResult::operation_failure("register-key", &error),
    }
}
