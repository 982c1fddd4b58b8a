//! Server-side handler for the EIP-155 exact scheme.
//!
//! [`ExactEvmServer`] turns route prices into payment requirements (money
//! strings become atomic USDC amounts) and enriches requirements with the
//! EIP-712 domain parameters clients need to sign.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use t402::proto::{SupportedPaymentKind, v2};
use t402::scheme::{AssetAmount, ExactScheme, SchemeServer, SchemeServerError};

use crate::chain::{AssetInfo, NetworkConfig};
use crate::networks::known_networks;

/// EVM server handler for the "exact" payment scheme.
pub struct ExactEvmServer {
    networks: Vec<NetworkConfig>,
}

impl ExactEvmServer {
    /// Creates a handler over all known EVM networks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            networks: known_networks(),
        }
    }

    /// Creates a handler over a custom network set.
    #[must_use]
    pub const fn with_networks(networks: Vec<NetworkConfig>) -> Self {
        Self { networks }
    }

    fn find_network(&self, network: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.network == network)
    }

    fn find_asset<'a>(config: &'a NetworkConfig, asset: &str) -> Option<&'a AssetInfo> {
        let address = asset.parse().ok()?;
        config.find_asset(address)
    }

    /// Converts a decimal money amount into the default asset's atomic
    /// units (e.g., `1.50` → `"1500000"` for 6-decimal USDC).
    fn money_to_default_asset(
        &self,
        amount: Decimal,
        network: &str,
    ) -> Result<AssetAmount, SchemeServerError> {
        let config = self
            .find_network(network)
            .ok_or_else(|| SchemeServerError::UnknownNetwork(network.to_owned()))?;
        let asset = config
            .assets
            .first()
            .ok_or_else(|| SchemeServerError::UnknownNetwork(network.to_owned()))?;

        let scale = Decimal::from(10u64.pow(u32::from(asset.decimals)));
        let atomic = (amount * scale).trunc();
        let atomic = atomic.to_u128().ok_or_else(|| {
            SchemeServerError::InvalidPrice(format!("amount out of range: {amount}"))
        })?;

        Ok(AssetAmount {
            amount: atomic.to_string(),
            asset: asset.address.to_string(),
            extra: Some(serde_json::json!({
                "name": asset.name,
                "version": asset.version,
            })),
        })
    }
}

impl Default for ExactEvmServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExactEvmServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactEvmServer")
            .field("networks", &self.networks.len())
            .finish_non_exhaustive()
    }
}

impl SchemeServer for ExactEvmServer {
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }

    fn parse_price(&self, price: &Value, network: &str) -> Result<AssetAmount, SchemeServerError> {
        // Structured form: { "asset": "0x..", "amount": "1000000", ... }
        if let Some(object) = price.as_object()
            && let Some(amount) = object.get("amount")
        {
            let asset = object
                .get("asset")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SchemeServerError::InvalidPrice(format!(
                        "asset address required for structured price on {network}"
                    ))
                })?;
            let amount = amount
                .as_str()
                .map_or_else(|| amount.to_string(), ToOwned::to_owned);
            return Ok(AssetAmount {
                amount,
                asset: asset.to_owned(),
                extra: object.get("extra").cloned(),
            });
        }

        // Money form: "1.50", "$1.50", or a bare number.
        let amount = if let Some(text) = price.as_str() {
            parse_money_string(text)?
        } else if let Some(number) = price.as_f64() {
            Decimal::try_from(number).map_err(|e| {
                SchemeServerError::InvalidPrice(format!("invalid price {number}: {e}"))
            })?
        } else {
            return Err(SchemeServerError::InvalidPrice(price.to_string()));
        };
        self.money_to_default_asset(amount, network)
    }

    fn enhance_requirements(
        &self,
        mut base: v2::PaymentRequirements,
        supported: &SupportedPaymentKind,
        _extensions: &[String],
    ) -> v2::PaymentRequirements {
        let network = base.network.to_string();
        let Some(config) = self.find_network(&network) else {
            return base;
        };

        // Default asset when the route did not name one.
        if base.asset.is_empty()
            && let Some(default_asset) = config.assets.first()
        {
            base.asset = default_asset.address.to_string();
        }

        // EIP-712 domain parameters: route extra wins, then the
        // facilitator's supported kind, then the static asset table.
        let mut extra = base
            .extra
            .take()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let supported_extra = supported.extra.as_ref().and_then(Value::as_object);
        let asset_info = Self::find_asset(config, &base.asset);
        for key in ["name", "version"] {
            if extra.contains_key(key) {
                continue;
            }
            let fallback = supported_extra
                .and_then(|o| o.get(key).cloned())
                .or_else(|| {
                    asset_info.map(|info| {
                        let value = if key == "name" { &info.name } else { &info.version };
                        Value::String(value.clone())
                    })
                });
            if let Some(value) = fallback {
                extra.insert(key.to_owned(), value);
            }
        }
        if !extra.is_empty() {
            base.extra = Some(Value::Object(extra));
        }
        base
    }
}

/// Parses a money string (e.g., `"1.50"`, `"$1.50"`) into a [`Decimal`].
fn parse_money_string(s: &str) -> Result<Decimal, SchemeServerError> {
    let cleaned = s.trim().trim_start_matches('$').trim();
    cleaned
        .parse::<Decimal>()
        .map_err(|e| SchemeServerError::InvalidPrice(format!("invalid money string '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::USDC_BASE_SEPOLIA;

    fn kind() -> SupportedPaymentKind {
        SupportedPaymentKind {
            t402_version: 2,
            scheme: "exact".to_owned(),
            network: "eip155:84532".to_owned(),
            asset: Some(USDC_BASE_SEPOLIA.to_string()),
            extra: Some(serde_json::json!({"name": "USDC", "version": "2"})),
            extensions: None,
        }
    }

    #[test]
    fn parses_money_string_into_atomic_usdc() {
        let server = ExactEvmServer::new();
        let parsed = server
            .parse_price(&serde_json::json!("1.50"), "eip155:84532")
            .unwrap();
        assert_eq!(parsed.amount, "1500000");
        assert_eq!(parsed.asset, USDC_BASE_SEPOLIA.to_string());

        let parsed = server
            .parse_price(&serde_json::json!("$0.01"), "eip155:84532")
            .unwrap();
        assert_eq!(parsed.amount, "10000");
    }

    #[test]
    fn passes_structured_price_through() {
        let server = ExactEvmServer::new();
        let parsed = server
            .parse_price(
                &serde_json::json!({"asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e", "amount": "42"}),
                "eip155:84532",
            )
            .unwrap();
        assert_eq!(parsed.amount, "42");
    }

    #[test]
    fn rejects_unknown_network_money_price() {
        let server = ExactEvmServer::new();
        assert!(matches!(
            server.parse_price(&serde_json::json!("1.00"), "eip155:999999"),
            Err(SchemeServerError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn enhancement_fills_domain_parameters() {
        let server = ExactEvmServer::new();
        let base = v2::PaymentRequirements {
            scheme: "exact".to_owned(),
            network: "eip155:84532".parse().unwrap(),
            amount: "1000".to_owned(),
            pay_to: "0x2222222222222222222222222222222222222222".to_owned(),
            max_timeout_seconds: 300,
            asset: USDC_BASE_SEPOLIA.to_string(),
            extra: None,
        };
        let enhanced = server.enhance_requirements(base, &kind(), &[]);
        let extra = enhanced.extra.unwrap();
        assert_eq!(extra["name"], "USDC");
        assert_eq!(extra["version"], "2");
    }
}
