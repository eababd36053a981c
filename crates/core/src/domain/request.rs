use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, MinorUnits};
use crate::assets::{AssetDescriptor, AssetRegistry};
use crate::errors::IntentError;

/// Flat wire record sent as the single `quote` parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub defuse_asset_identifier_in: String,
    pub defuse_asset_identifier_out: String,
    pub exact_amount_in: MinorUnits,
    pub min_deadline_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_amount_out: Option<MinorUnits>,
}

/// Both sides resolved; only reachable through [`IntentRequestBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRequest {
    pub asset_in: Amount,
    pub asset_out: AssetDescriptor,
    pub amount_out: Option<Amount>,
    pub min_deadline_ms: u64,
}

impl IntentRequest {
    pub fn builder(registry: &AssetRegistry, min_deadline_ms: u64) -> IntentRequestBuilder<'_> {
        IntentRequestBuilder { registry, min_deadline_ms, asset_in: None, asset_out: None }
    }

    /// Variable-output requests let solvers compete on `amount_out`.
    pub fn is_fixed_output(&self) -> bool {
        self.amount_out.is_some()
    }

    pub fn to_wire(&self) -> QuoteRequest {
        QuoteRequest {
            defuse_asset_identifier_in: self.asset_in.asset.asset_id.clone(),
            defuse_asset_identifier_out: self.asset_out.asset_id.clone(),
            exact_amount_in: self.asset_in.units,
            min_deadline_ms: self.min_deadline_ms,
            exact_amount_out: self.amount_out.as_ref().map(|amount| amount.units),
        }
    }
}

/// Each `with_*` call consumes the builder and hands back a new value, so a
/// partially built request can never be observed after it is serialised.
#[derive(Clone, Debug)]
pub struct IntentRequestBuilder<'r> {
    registry: &'r AssetRegistry,
    min_deadline_ms: u64,
    asset_in: Option<Amount>,
    asset_out: Option<(AssetDescriptor, Option<Amount>)>,
}

impl<'r> IntentRequestBuilder<'r> {
    pub fn with_asset_in(self, symbol: &str, amount: Decimal) -> Result<Self, IntentError> {
        let asset = self.registry.resolve(symbol)?;
        let amount = Amount::positive(asset, amount)?;
        Ok(Self { asset_in: Some(amount), ..self })
    }

    pub fn with_asset_out(self, symbol: &str, amount: Option<Decimal>) -> Result<Self, IntentError> {
        let asset = self.registry.resolve(symbol)?.clone();
        let amount = amount.map(|value| Amount::positive(&asset, value)).transpose()?;
        Ok(Self { asset_out: Some((asset, amount)), ..self })
    }

    pub fn build(self) -> Result<IntentRequest, IntentError> {
        let asset_in = self.asset_in.ok_or_else(|| {
            IntentError::IncompleteRequest("input asset and amount are not set".to_string())
        })?;
        let (asset_out, amount_out) = self.asset_out.ok_or_else(|| {
            IntentError::IncompleteRequest("output asset is not set".to_string())
        })?;
        if asset_in.asset.asset_id == asset_out.asset_id {
            return Err(IntentError::IncompleteRequest(format!(
                "input and output are both `{}`",
                asset_out.symbol
            )));
        }

        Ok(IntentRequest { asset_in, asset_out, amount_out, min_deadline_ms: self.min_deadline_ms })
    }

    pub fn serialize(self) -> Result<QuoteRequest, IntentError> {
        self.build().map(|request| request.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde_json::json;

    use super::IntentRequest;
    use crate::assets::AssetRegistry;
    use crate::errors::IntentError;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("valid decimal literal")
    }

    #[test]
    fn serialize_requires_both_sides() {
        let registry = AssetRegistry::default();

        let empty = IntentRequest::builder(&registry, 60_000).serialize();
        assert!(matches!(empty, Err(IntentError::IncompleteRequest(_))));

        let only_in = IntentRequest::builder(&registry, 60_000)
            .with_asset_in("NEAR", dec("1"))
            .expect("input")
            .serialize();
        assert!(matches!(only_in, Err(IntentError::IncompleteRequest(_))));

        let only_out = IntentRequest::builder(&registry, 60_000)
            .with_asset_out("USDC", None)
            .expect("output")
            .serialize();
        assert!(matches!(only_out, Err(IntentError::IncompleteRequest(_))));
    }

    #[test]
    fn variable_output_omits_exact_amount_out() {
        let registry = AssetRegistry::default();
        let wire = IntentRequest::builder(&registry, 60_000)
            .with_asset_in("near", dec("0.5"))
            .and_then(|builder| builder.with_asset_out("usdc", None))
            .and_then(|builder| builder.serialize())
            .expect("complete request");

        assert_eq!(
            serde_json::to_value(&wire).expect("json"),
            json!({
                "defuse_asset_identifier_in": "near",
                "defuse_asset_identifier_out":
                    "nep141:17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1",
                "exact_amount_in": "500000000000000000000000",
                "min_deadline_ms": 60000
            })
        );
    }

    #[test]
    fn fixed_output_carries_exact_amount_out() {
        let registry = AssetRegistry::default();
        let request = IntentRequest::builder(&registry, 60_000)
            .with_asset_in("USDC", dec("10"))
            .and_then(|builder| builder.with_asset_out("ZCASH", Some(dec("0.25"))))
            .and_then(|builder| builder.build())
            .expect("complete request");

        assert!(request.is_fixed_output());
        let value = serde_json::to_value(request.to_wire()).expect("json");
        assert_eq!(value["exact_amount_out"], "25000000");
        assert_eq!(value["exact_amount_in"], "10000000");
    }

    #[test]
    fn rejects_invalid_sides_eagerly() {
        let registry = AssetRegistry::default();

        let unknown = IntentRequest::builder(&registry, 60_000).with_asset_in("DOGE", dec("1"));
        assert!(matches!(unknown, Err(IntentError::UnknownAsset(_))));

        let zero = IntentRequest::builder(&registry, 60_000).with_asset_in("NEAR", Decimal::ZERO);
        assert!(matches!(zero, Err(IntentError::InvalidAmount(_))));

        let same = IntentRequest::builder(&registry, 60_000)
            .with_asset_in("NEAR", dec("1"))
            .and_then(|builder| builder.with_asset_out("near", None))
            .and_then(|builder| builder.build());
        assert!(matches!(same, Err(IntentError::IncompleteRequest(_))));
    }
}
