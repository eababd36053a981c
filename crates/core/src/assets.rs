use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::IntentError;

/// Asset identifier used by the settlement contract for the native asset.
pub const NATIVE_ASSET_ID: &str = "near";
pub const NATIVE_SYMBOL: &str = "NEAR";

/// Namespace for fungible-token asset identifiers on the settlement contract.
pub const FUNGIBLE_TOKEN_SCHEME: &str = "nep141";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub symbol: String,
    /// Token contract holding balances and storage registrations.
    pub contract_id: String,
    /// Identifier the settlement contract and solvers use in diffs and quotes.
    pub asset_id: String,
    pub decimals: u32,
    /// Custody contract for the cross-chain representation, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridged_contract_id: Option<String>,
}

impl AssetDescriptor {
    pub fn fungible(symbol: impl Into<String>, contract_id: impl Into<String>, decimals: u32) -> Self {
        let symbol: String = symbol.into();
        let contract_id = contract_id.into();
        Self {
            symbol: symbol.to_ascii_uppercase(),
            asset_id: format!("{FUNGIBLE_TOKEN_SCHEME}:{contract_id}"),
            contract_id,
            decimals,
            bridged_contract_id: None,
        }
    }

    pub fn native(contract_id: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: NATIVE_SYMBOL.to_string(),
            contract_id: contract_id.into(),
            asset_id: NATIVE_ASSET_ID.to_string(),
            decimals,
            bridged_contract_id: None,
        }
    }

    pub fn with_bridged_contract(mut self, bridged: impl Into<String>) -> Self {
        self.bridged_contract_id = Some(bridged.into());
        self
    }

    pub fn is_native(&self) -> bool {
        self.asset_id == NATIVE_ASSET_ID
    }
}

/// Read-only symbol table shared by every orchestrator invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRegistry {
    assets: BTreeMap<String, AssetDescriptor>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::from_descriptors(builtin_assets())
    }
}

impl AssetRegistry {
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = AssetDescriptor>) -> Self {
        let assets = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.symbol.to_ascii_uppercase(), descriptor))
            .collect();
        Self { assets }
    }

    /// Built-in table with config-supplied descriptors layered on top; a
    /// repeated symbol replaces the built-in entry.
    pub fn with_overrides(overrides: impl IntoIterator<Item = AssetDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in overrides {
            registry.assets.insert(descriptor.symbol.to_ascii_uppercase(), descriptor);
        }
        registry
    }

    pub fn resolve(&self, symbol: &str) -> Result<&AssetDescriptor, IntentError> {
        self.assets
            .get(&symbol.trim().to_ascii_uppercase())
            .ok_or_else(|| IntentError::UnknownAsset(symbol.to_string()))
    }

    pub fn asset_id(&self, symbol: &str) -> Result<&str, IntentError> {
        self.resolve(symbol).map(|descriptor| descriptor.asset_id.as_str())
    }

    pub fn native(&self) -> Result<&AssetDescriptor, IntentError> {
        self.assets
            .values()
            .find(|descriptor| descriptor.is_native())
            .ok_or_else(|| IntentError::UnknownAsset(NATIVE_SYMBOL.to_string()))
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.assets.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.resolve(symbol).is_ok()
    }
}

fn builtin_assets() -> Vec<AssetDescriptor> {
    vec![
        AssetDescriptor::native("wrap.near", 24),
        AssetDescriptor::fungible(
            "USDC",
            "17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1",
            6,
        )
        .with_bridged_contract("eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near"),
        AssetDescriptor::fungible("ZCASH", "zec.omft.near", 8),
    ]
}

#[cfg(test)]
mod tests {
    use super::{AssetDescriptor, AssetRegistry};
    use crate::errors::IntentError;

    #[test]
    fn resolves_builtin_symbols_case_insensitively() {
        let registry = AssetRegistry::default();

        let usdc = registry.resolve("usdc").expect("usdc is built in");
        assert_eq!(usdc.decimals, 6);
        assert_eq!(
            usdc.asset_id,
            "nep141:17208628f84f5d6ad33f0da3bbbeb27ffcb398eac501a31bd6ad2011e36133a1"
        );
        assert_eq!(registry.asset_id("ZCASH").expect("zcash"), "nep141:zec.omft.near");
    }

    #[test]
    fn native_asset_uses_fixed_literal() {
        let registry = AssetRegistry::default();
        let native = registry.native().expect("native asset present");

        assert_eq!(native.asset_id, "near");
        assert_eq!(native.contract_id, "wrap.near");
        assert_eq!(native.decimals, 24);
        assert!(native.is_native());
    }

    #[test]
    fn unknown_symbol_fails() {
        let registry = AssetRegistry::default();
        let error = registry.resolve("DOGE").expect_err("DOGE is not registered");
        assert_eq!(error, IntentError::UnknownAsset("DOGE".to_string()));
    }

    #[test]
    fn overrides_replace_and_extend_builtins() {
        let registry = AssetRegistry::with_overrides(vec![
            AssetDescriptor::fungible("usdc", "usdc.fakes.testnet", 6),
            AssetDescriptor::fungible("AURORA", "aurora.factory.bridge.near", 18),
        ]);

        assert_eq!(registry.asset_id("USDC").expect("usdc"), "nep141:usdc.fakes.testnet");
        assert!(registry.contains("aurora"));
        assert_eq!(registry.symbols().len(), 4);
    }
}
