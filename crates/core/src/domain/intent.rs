use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::amount::MinorUnits;
use crate::errors::IntentError;

/// One candidate fill returned by the solver bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteOption {
    pub quote_hash: String,
    #[serde(deserialize_with = "amount_text")]
    pub amount_out: String,
    #[serde(
        default,
        deserialize_with = "optional_amount_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    /// Solver-specific fields passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl QuoteOption {
    pub fn new(quote_hash: impl Into<String>, amount_out: impl Into<String>) -> Self {
        Self {
            quote_hash: quote_hash.into(),
            amount_out: amount_out.into(),
            amount_in: None,
            expiration_time: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn amount_out_units(&self) -> Option<MinorUnits> {
        self.amount_out.parse().ok()
    }

    pub fn amount_in_units(&self) -> Option<MinorUnits> {
        self.amount_in.as_deref().and_then(|raw| raw.parse().ok())
    }
}

/// Some solvers send amounts as JSON numbers; keep their text either way.
fn amount_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!("expected an amount, got {other}"))),
    }
}

fn optional_amount_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(serde::de::Error::custom(format!("expected an amount, got {other}"))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    TokenDiff {
        diff: BTreeMap<String, String>,
    },
    FtWithdraw {
        token: String,
        receiver_id: String,
        amount: MinorUnits,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
}

impl Intent {
    /// Outgoing leg is negative, incoming leg is the bare unsigned amount.
    pub fn token_diff(
        asset_in: &str,
        amount_in: MinorUnits,
        asset_out: &str,
        amount_out: MinorUnits,
    ) -> Self {
        let mut diff = BTreeMap::new();
        diff.insert(asset_in.to_string(), amount_in.negated());
        diff.insert(asset_out.to_string(), amount_out.to_string());
        Self::TokenDiff { diff }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenDiff { .. } => "token_diff",
            Self::FtWithdraw { .. } => "ft_withdraw",
        }
    }
}

/// 256 random bits, base64 encoded. Never reused across quotes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(pub String);

impl Nonce {
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(STANDARD.encode(bytes))
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute expiry, serialised as RFC 3339 UTC with millisecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(pub DateTime<Utc>);

impl Deadline {
    pub fn after(now: DateTime<Utc>, validity_ms: u64) -> Self {
        let millis = i64::try_from(validity_ms).unwrap_or(i64::MAX);
        Self(now.checked_add_signed(Duration::milliseconds(millis)).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    pub fn from_now(validity_ms: u64) -> Self {
        Self::after(Utc::now(), validity_ms)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_later_than(&self, instant: DateTime<Utc>) -> bool {
        self.0 > instant
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FromStr for Deadline {
    type Err = IntentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Self(parsed.with_timezone(&Utc)))
            .map_err(|error| IntentError::Serialization(format!("invalid deadline `{raw}`: {error}")))
    }
}

impl Serialize for Deadline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Deadline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Settlement envelope; its JSON text is the payload that gets signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub nonce: Nonce,
    pub signer_id: String,
    pub verifying_contract: String,
    pub deadline: Deadline,
    pub intents: Vec<Intent>,
}

impl Quote {
    pub fn new(
        signer_id: impl Into<String>,
        verifying_contract: impl Into<String>,
        deadline: Deadline,
        intents: Vec<Intent>,
    ) -> Self {
        Self {
            nonce: Nonce::random(),
            signer_id: signer_id.into(),
            verifying_contract: verifying_contract.into(),
            deadline,
            intents,
        }
    }

    pub fn to_payload(&self) -> Result<String, IntentError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub standard: String,
    pub payload: String,
    pub signature: String,
    pub public_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishIntent {
    pub signed_data: Commitment,
    pub quote_hashes: Vec<String>,
}

/// Argument of the settlement contract's `execute_intents` method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIntents {
    pub signed: Vec<Commitment>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{Deadline, Intent, Nonce, Quote, QuoteOption};
    use crate::amount::MinorUnits;

    #[test]
    fn token_diff_signs_outgoing_leg_only() {
        let intent = Intent::token_diff("nep141:usdc", MinorUnits(1_000_000), "nep141:zec", MinorUnits(500_000_000));
        let value = serde_json::to_value(&intent).expect("serialize");

        assert_eq!(
            value,
            json!({
                "intent": "token_diff",
                "diff": { "nep141:usdc": "-1000000", "nep141:zec": "500000000" }
            })
        );
    }

    #[test]
    fn withdraw_omits_absent_memo() {
        let plain = Intent::FtWithdraw {
            token: "wrap.near".to_string(),
            receiver_id: "bob.near".to_string(),
            amount: MinorUnits(5),
            memo: None,
        };
        let value = serde_json::to_value(&plain).expect("serialize");
        assert_eq!(value["intent"], "ft_withdraw");
        assert_eq!(value["amount"], "5");
        assert!(value.get("memo").is_none());
    }

    #[test]
    fn deadline_uses_millisecond_rfc3339() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 11, 57, 59).single().expect("valid instant");
        let deadline = Deadline::after(now, 120_000);

        assert_eq!(deadline.to_string(), "2025-12-31T11:59:59.000Z");
        assert_eq!("2025-12-31T11:59:59.000Z".parse::<Deadline>().expect("parse"), deadline);
        assert!(deadline.is_later_than(now));
    }

    #[test]
    fn nonces_are_32_bytes_and_fresh() {
        let first = Nonce::random();
        let second = Nonce::random();
        assert_ne!(first, second);
        assert_eq!(first.0.len(), 44);
    }

    #[test]
    fn quote_payload_keeps_field_order() {
        let quote = Quote::new("alice.near", "intents.near", Deadline::from_now(1_000), vec![]);
        let payload = quote.to_payload().expect("payload");
        assert!(payload.starts_with("{\"nonce\":"));
        assert!(payload.contains("\"verifying_contract\":\"intents.near\""));
    }

    #[test]
    fn quote_option_keeps_solver_fields() {
        let option: QuoteOption = serde_json::from_value(json!({
            "quote_hash": "hash-1",
            "amount_out": "25",
            "amount_in": "10",
            "defuse_asset_identifier_in": "near",
        }))
        .expect("deserialize");

        assert_eq!(option.amount_out_units(), Some(MinorUnits(25)));
        assert_eq!(option.amount_in_units(), Some(MinorUnits(10)));
        assert_eq!(option.extra["defuse_asset_identifier_in"], "near");
    }

    #[test]
    fn quote_option_accepts_numeric_amounts() {
        let option: QuoteOption = serde_json::from_value(json!({
            "quote_hash": "hash-2",
            "amount_out": 500000000,
            "amount_in": null,
        }))
        .expect("deserialize");

        assert_eq!(option.amount_out, "500000000");
        assert_eq!(option.amount_in, None);
        assert!(serde_json::from_value::<QuoteOption>(json!({"amount_out": "1"})).is_err());
    }
}
