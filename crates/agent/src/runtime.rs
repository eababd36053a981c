use std::sync::Arc;

use async_trait::async_trait;
use intentdesk_core::assets::AssetRegistry;
use intentdesk_core::errors::{IntentError, InterfaceError};
use intentdesk_core::negotiation::SolverBus;
use intentdesk_core::network::SettlementNetwork;
use intentdesk_core::orchestrator::{
    AccountStatus, DepositReceipt, DepositRequest, IntentOrchestrator, OperationContext,
    SettlementRoute, SwapOutcome, SwapRequest, WithdrawReceipt, WithdrawRequest,
};
use intentdesk_core::progress::{
    FanoutProgressSink, InMemoryProgressSink, ProgressEvent, TracingProgressSink,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::conversation::{AgentCommand, CommandInterpreter, Interpretation};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};

/// What the command layer needs from the orchestrator, object-safe so the
/// runtime does not carry the transport type parameters.
#[async_trait]
pub trait IntentService: Send + Sync {
    fn account_id(&self) -> &str;

    async fn swap(
        &self,
        request: SwapRequest,
        ctx: &OperationContext,
    ) -> Result<SwapOutcome, IntentError>;

    async fn deposit(
        &self,
        request: DepositRequest,
        ctx: &OperationContext,
    ) -> Result<DepositReceipt, IntentError>;

    async fn withdraw(
        &self,
        request: WithdrawRequest,
        ctx: &OperationContext,
    ) -> Result<WithdrawReceipt, IntentError>;

    async fn status(&self) -> Result<AccountStatus, IntentError>;
}

#[async_trait]
impl<B, N> IntentService for IntentOrchestrator<B, N>
where
    B: SolverBus,
    N: SettlementNetwork,
{
    fn account_id(&self) -> &str {
        IntentOrchestrator::account_id(self)
    }

    async fn swap(
        &self,
        request: SwapRequest,
        ctx: &OperationContext,
    ) -> Result<SwapOutcome, IntentError> {
        IntentOrchestrator::swap(self, request, ctx).await
    }

    async fn deposit(
        &self,
        request: DepositRequest,
        ctx: &OperationContext,
    ) -> Result<DepositReceipt, IntentError> {
        IntentOrchestrator::deposit(self, request, ctx).await
    }

    async fn withdraw(
        &self,
        request: WithdrawRequest,
        ctx: &OperationContext,
    ) -> Result<WithdrawReceipt, IntentError> {
        IntentOrchestrator::withdraw(self, request, ctx).await
    }

    async fn status(&self) -> Result<AccountStatus, IntentError> {
        IntentOrchestrator::status(self).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Completed,
    /// No market right now; not an error.
    Unavailable,
    Unrecognized,
    Denied,
    Failed,
}

/// Result of one free-text command: the transcript a chat user sees plus the
/// structured progress events behind it.
#[derive(Clone, Debug, Serialize)]
pub struct CommandReport {
    pub correlation_id: String,
    pub action: Option<&'static str>,
    pub status: CommandStatus,
    pub transcript: Vec<String>,
    pub events: Vec<ProgressEvent>,
}

impl CommandReport {
    pub fn output(&self) -> String {
        let mut output = self.transcript.join("\n");
        output.push('\n');
        output
    }
}

struct Transcript {
    correlation_id: String,
    lines: Vec<String>,
}

impl Transcript {
    fn say(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn json(&mut self, value: &impl Serialize) {
        match serde_json::to_string_pretty(value) {
            Ok(rendered) => self.lines.push(rendered),
            Err(error) => self.lines.push(format!("(unrenderable response: {error})")),
        }
    }

    fn finish(
        self,
        action: Option<&'static str>,
        status: CommandStatus,
        events: Vec<ProgressEvent>,
    ) -> CommandReport {
        CommandReport {
            correlation_id: self.correlation_id,
            action,
            status,
            transcript: self.lines,
            events,
        }
    }
}

pub struct AgentRuntime {
    interpreter: Arc<dyn CommandInterpreter>,
    guardrails: GuardrailPolicy,
    registry: Arc<AssetRegistry>,
    service: Arc<dyn IntentService>,
}

impl AgentRuntime {
    pub fn new(
        interpreter: Arc<dyn CommandInterpreter>,
        guardrails: GuardrailPolicy,
        registry: Arc<AssetRegistry>,
        service: Arc<dyn IntentService>,
    ) -> Self {
        Self { interpreter, guardrails, registry, service }
    }

    pub fn service(&self) -> &Arc<dyn IntentService> {
        &self.service
    }

    pub fn interpreter_name(&self) -> &'static str {
        self.interpreter.name()
    }

    pub async fn handle_command(&self, text: &str, channel: Option<&str>) -> CommandReport {
        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "agent.command_received",
            correlation_id = %correlation_id,
            channel = channel.unwrap_or("http"),
            interpreter = self.interpreter.name(),
            "command received"
        );

        let collected = Arc::new(InMemoryProgressSink::default());
        let sink = FanoutProgressSink::default()
            .with(collected.clone())
            .with(Arc::new(TracingProgressSink));
        let ctx = OperationContext::new(correlation_id.clone(), Arc::new(sink));
        let mut transcript = Transcript { correlation_id, lines: Vec::new() };
        transcript.say(format!("Processing command: {text}"));

        let command = match self.interpreter.interpret(text).await {
            Interpretation::Command(command) => command,
            Interpretation::Unrecognized { reason } => {
                transcript.say("Could not interpret command.");
                transcript.say(format!("Reason: {reason}"));
                return transcript.finish(None, CommandStatus::Unrecognized, Vec::new());
            }
        };
        let action = Some(command.action());

        if let GuardrailDecision::Deny { reason_code, user_message, .. } =
            self.guardrails.evaluate(&command, &self.registry)
        {
            info!(
                event_name = "agent.command_denied",
                correlation_id = %ctx.correlation_id,
                reason_code,
                "guardrail denied command"
            );
            transcript.say(user_message);
            return transcript.finish(action, CommandStatus::Denied, Vec::new());
        }

        transcript.say(format!("Executing {}.", command.describe()));
        let status = self.execute(command, &ctx, &mut transcript).await;
        let events = collected.events();
        let mut lines = events.iter().map(ProgressEvent::summary).collect::<Vec<_>>();
        // Progress lines go between the announcement and the result.
        let result_lines = transcript.lines.split_off(2);
        transcript.lines.append(&mut lines);
        transcript.lines.extend(result_lines);

        info!(
            event_name = "agent.command_completed",
            correlation_id = %ctx.correlation_id,
            status = ?status,
            "command finished"
        );
        transcript.finish(action, status, events)
    }

    async fn execute(
        &self,
        command: AgentCommand,
        ctx: &OperationContext,
        transcript: &mut Transcript,
    ) -> CommandStatus {
        match command {
            AgentCommand::Status => match self.service.status().await {
                Ok(status) => {
                    transcript.say(format!(
                        "Account {} balance: {} NEAR",
                        status.account_id, status.balance
                    ));
                    CommandStatus::Completed
                }
                Err(error) => {
                    report_error(transcript, "status check", error, &ctx.correlation_id)
                }
            },
            AgentCommand::Swap { asset_in, amount, target_token } => {
                let request = SwapRequest::new(asset_in, amount, target_token);
                match self.service.swap(request, ctx).await {
                    Ok(SwapOutcome::Published(receipt)) => {
                        transcript.say("Swap executed successfully. Response:");
                        transcript.json(&receipt.response);
                        CommandStatus::Completed
                    }
                    Ok(SwapOutcome::Unavailable(unavailable)) => {
                        transcript.say(match unavailable.reason {
                            IntentError::NoViableOption => {
                                "No viable quote right now. Try again shortly."
                            }
                            _ => "No solver offered a quote for this swap right now.",
                        });
                        CommandStatus::Unavailable
                    }
                    Err(error) => report_error(transcript, "swap", error, &ctx.correlation_id),
                }
            }
            AgentCommand::Deposit { asset, amount } => {
                match self.service.deposit(DepositRequest { asset, amount }, ctx).await {
                    Ok(receipt) => {
                        transcript.say("Deposit executed successfully.");
                        transcript.json(&receipt);
                        CommandStatus::Completed
                    }
                    Err(error) => report_error(transcript, "deposit", error, &ctx.correlation_id),
                }
            }
            AgentCommand::Withdraw { asset, amount, destination } => {
                let request = WithdrawRequest {
                    asset,
                    amount,
                    destination,
                    route: SettlementRoute::SolverBus,
                };
                match self.service.withdraw(request, ctx).await {
                    Ok(receipt) => {
                        transcript.say("Withdrawal published. Response:");
                        transcript.json(&receipt.response);
                        CommandStatus::Completed
                    }
                    Err(error) => report_error(transcript, "withdraw", error, &ctx.correlation_id),
                }
            }
        }
    }
}

fn report_error(
    transcript: &mut Transcript,
    operation: &str,
    error: IntentError,
    correlation_id: &str,
) -> CommandStatus {
    let detail = error.to_string();
    match error.into_interface(correlation_id) {
        InterfaceError::BadRequest { .. } => {
            transcript.say(format!("Error during {operation}: {detail}"));
        }
        other => {
            transcript.say(format!(
                "Error during {operation}: {} (reference {})",
                other.user_message(),
                other.correlation_id()
            ));
        }
    }
    CommandStatus::Failed
}

/// Renders a report the way the HTTP surface returns it.
pub fn report_payload(report: &CommandReport) -> Value {
    serde_json::json!({
        "status": "OK",
        "output": report.output(),
        "correlation_id": report.correlation_id,
        "result": report.status,
    })
}
