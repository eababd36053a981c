use crate::commands::{open_session, CommandResult};

pub fn run() -> CommandResult {
    let session = match open_session("status") {
        Ok(session) => session,
        Err(result) => return result,
    };

    match session.runtime.block_on(session.orchestrator.status()) {
        Ok(status) => CommandResult::success_with(
            "status",
            format!("account {} holds {} NEAR", status.account_id, status.balance),
            &status,
        ),
        Err(error) => CommandResult::operation_failure("status", &error),
    }
}
