use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use intentdesk_core::assets::NATIVE_SYMBOL;
use intentdesk_core::orchestrator::WithdrawDestination;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::llm::LlmClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentCommand {
    Swap { asset_in: String, amount: Decimal, target_token: String },
    Deposit { asset: String, amount: Decimal },
    Withdraw { asset: String, amount: Decimal, destination: WithdrawDestination },
    Status,
}

impl AgentCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Swap { .. } => "swap",
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Status => "status",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Swap { asset_in, amount, target_token } => {
                format!("swap of {} {asset_in} to {target_token}", amount.normalize())
            }
            Self::Deposit { asset, amount } => format!("deposit of {} {asset}", amount.normalize()),
            Self::Withdraw { asset, amount, destination } => match destination {
                WithdrawDestination::Near { receiver_id } => {
                    format!("withdrawal of {} {asset} to {receiver_id}", amount.normalize())
                }
                WithdrawDestination::Foreign { network, address } => format!(
                    "withdrawal of {} {asset} to {address} on {network}",
                    amount.normalize()
                ),
            },
            Self::Status => "status check".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interpretation {
    Command(AgentCommand),
    Unrecognized { reason: String },
}

impl Interpretation {
    fn unrecognized(reason: impl Into<String>) -> Self {
        Self::Unrecognized { reason: reason.into() }
    }
}

/// Turns free text into a structured command. Never decides amounts or
/// tokens on its own; anything it cannot read is `Unrecognized`.
#[async_trait]
pub trait CommandInterpreter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn interpret(&self, text: &str) -> Interpretation;
}

/// Deterministic grammar: `swap 0.5 near to usdc`, `deposit 1 near`,
/// `withdraw 5 usdc to 0xabc on eth`, `status`.
#[derive(Clone, Debug, Default)]
pub struct KeywordInterpreter;

impl KeywordInterpreter {
    pub fn parse(&self, text: &str) -> Interpretation {
        let tokens = tokenize(&text.to_ascii_lowercase());
        let Some(action) = tokens.iter().find_map(|token| action_keyword(token)) else {
            return Interpretation::unrecognized("no supported action (swap, deposit, withdraw, status)");
        };
        if action == "status" {
            return Interpretation::Command(AgentCommand::Status);
        }

        let Some((amount_index, amount)) = find_amount(&tokens) else {
            return Interpretation::unrecognized(format!("no amount given for {action}"));
        };
        let asset_after_amount = tokens
            .get(amount_index + 1)
            .filter(|token| !is_connector(token) && is_symbol(token))
            .map(|token| token.to_ascii_uppercase());
        let after = |keyword: &str| {
            tokens
                .iter()
                .skip(amount_index + 1)
                .skip_while(|token| token.as_str() != keyword)
                .nth(1)
                .cloned()
        };

        match action {
            "swap" => {
                let target = after("to").or_else(|| after("into")).or_else(|| after("for"));
                match target {
                    Some(target) => Interpretation::Command(AgentCommand::Swap {
                        asset_in: asset_after_amount.unwrap_or_else(|| NATIVE_SYMBOL.to_string()),
                        amount,
                        target_token: target.to_ascii_uppercase(),
                    }),
                    None => Interpretation::unrecognized("no target token given for swap"),
                }
            }
            "deposit" => Interpretation::Command(AgentCommand::Deposit {
                asset: asset_after_amount.unwrap_or_else(|| NATIVE_SYMBOL.to_string()),
                amount,
            }),
            _ => {
                let Some(receiver) = after("to") else {
                    return Interpretation::unrecognized("no destination given for withdraw");
                };
                let destination = WithdrawDestination::for_network(receiver, after("on"));
                Interpretation::Command(AgentCommand::Withdraw {
                    asset: asset_after_amount.unwrap_or_else(|| NATIVE_SYMBOL.to_string()),
                    amount,
                    destination,
                })
            }
        }
    }
}

#[async_trait]
impl CommandInterpreter for KeywordInterpreter {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn interpret(&self, text: &str) -> Interpretation {
        self.parse(text)
    }
}

pub const INTERPRETER_PROMPT: &str = "Extract the intent from the following command and output a \
JSON object with the keys 'action' and 'params'. The possible actions are 'deposit', 'swap', \
'withdraw' and 'status'. For a deposit, include 'amount' and optionally 'token' (default NEAR). \
For a swap, include 'target_token' (e.g. 'ZCASH'), 'amount' and optionally 'asset_in' (default \
NEAR). For a withdraw, include 'amount', 'token', 'destination' and optionally 'network'. \
Output only the JSON object.";

/// LLM-backed interpretation with the keyword grammar as fallback when the
/// service is unreachable or its answer does not parse.
pub struct LlmInterpreter {
    client: Arc<dyn LlmClient>,
    fallback: KeywordInterpreter,
}

impl LlmInterpreter {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, fallback: KeywordInterpreter }
    }

    pub fn prompt(text: &str) -> String {
        format!("{INTERPRETER_PROMPT}\n\nCommand: {text}\n\nOutput:")
    }
}

#[async_trait]
impl CommandInterpreter for LlmInterpreter {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn interpret(&self, text: &str) -> Interpretation {
        let completion = match self.client.complete(&Self::prompt(text)).await {
            Ok(completion) => completion,
            Err(error) => {
                warn!(
                    event_name = "agent.interpreter_unavailable",
                    error = %error,
                    "llm interpretation failed; using keyword grammar"
                );
                return self.fallback.parse(text);
            }
        };

        match parse_command_json(&completion) {
            Ok(command) => Interpretation::Command(command),
            Err(reason) => {
                warn!(
                    event_name = "agent.interpreter_unparseable",
                    reason = %reason,
                    "llm answer did not parse; using keyword grammar"
                );
                self.fallback.parse(text)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    action: String,
    #[serde(default)]
    params: RawParams,
}

#[derive(Debug, Default, Deserialize)]
struct RawParams {
    amount: Option<Value>,
    target_token: Option<String>,
    asset_in: Option<String>,
    token: Option<String>,
    destination: Option<String>,
    network: Option<String>,
}

/// Reads `{action, params: {amount, target_token, ...}}`, tolerating code
/// fences or prose around the object.
pub fn parse_command_json(completion: &str) -> Result<AgentCommand, String> {
    let start = completion.find('{').ok_or("no JSON object in answer")?;
    let end = completion.rfind('}').ok_or("no JSON object in answer")?;
    if end < start {
        return Err("no JSON object in answer".to_string());
    }
    let raw: RawCommand = serde_json::from_str(&completion[start..=end])
        .map_err(|error| format!("malformed command JSON: {error}"))?;
    let params = raw.params;
    let symbol = |value: Option<String>| {
        value
            .map(|value| value.trim().to_ascii_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| NATIVE_SYMBOL.to_string())
    };

    match raw.action.trim().to_ascii_lowercase().as_str() {
        "status" => Ok(AgentCommand::Status),
        "swap" => {
            let target_token = params
                .target_token
                .map(|token| token.trim().to_ascii_uppercase())
                .filter(|token| !token.is_empty())
                .ok_or("swap without target_token")?;
            Ok(AgentCommand::Swap {
                asset_in: symbol(params.asset_in),
                amount: json_amount(params.amount.as_ref())?,
                target_token,
            })
        }
        "deposit" => Ok(AgentCommand::Deposit {
            asset: symbol(params.token),
            amount: json_amount(params.amount.as_ref())?,
        }),
        "withdraw" => {
            let receiver = params
                .destination
                .map(|destination| destination.trim().to_string())
                .filter(|destination| !destination.is_empty())
                .ok_or("withdraw without destination")?;
            Ok(AgentCommand::Withdraw {
                asset: symbol(params.token),
                amount: json_amount(params.amount.as_ref())?,
                destination: WithdrawDestination::for_network(receiver, params.network),
            })
        }
        other => Err(format!("unsupported action `{other}`")),
    }
}

fn json_amount(value: Option<&Value>) -> Result<Decimal, String> {
    let raw = match value {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.trim().to_string(),
        _ => return Err("missing amount".to_string()),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|error| format!("unreadable amount `{raw}`: {error}"))
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_end_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn action_keyword(token: &str) -> Option<&'static str> {
    match token {
        "swap" | "exchange" | "convert" | "trade" => Some("swap"),
        "deposit" | "fund" => Some("deposit"),
        "withdraw" => Some("withdraw"),
        "status" | "balance" => Some("status"),
        _ => None,
    }
}

fn find_amount(tokens: &[String]) -> Option<(usize, Decimal)> {
    tokens.iter().enumerate().find_map(|(index, token)| {
        if token.starts_with("0x") {
            return None;
        }
        Decimal::from_str(token).ok().map(|amount| (index, amount))
    })
}

fn is_connector(token: &str) -> bool {
    matches!(token, "to" | "into" | "for" | "of" | "on")
}

fn is_symbol(token: &str) -> bool {
    token.chars().all(|character| character.is_ascii_alphabetic())
}
