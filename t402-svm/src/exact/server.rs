//! Server-side handler for the Solana exact scheme.
//!
//! Turns route prices into USDC base-unit amounts and fills the
//! facilitator fee payer into requirement `extra` so clients can reserve
//! its signer slot.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use t402::proto::{SupportedPaymentKind, v2};
use t402::scheme::{AssetAmount, ExactScheme, SchemeServer, SchemeServerError};

use crate::networks::{USDC_DECIMALS, default_usdc_mint};

/// Solana server handler for the "exact" payment scheme.
#[derive(Debug, Default)]
pub struct ExactSvmServer;

impl ExactSvmServer {
    /// Creates the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SchemeServer for ExactSvmServer {
    fn scheme(&self) -> &str {
        ExactScheme::NAME
    }

    fn parse_price(&self, price: &Value, network: &str) -> Result<AssetAmount, SchemeServerError> {
        // Structured form: { "asset": "<mint>", "amount": "1000" }
        if let Some(object) = price.as_object()
            && let Some(amount) = object.get("amount")
        {
            let asset = object
                .get("asset")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SchemeServerError::InvalidPrice(format!(
                        "mint address required for structured price on {network}"
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

        // Money form: "1.50", "$1.50", or a bare number, priced in USDC.
        let mint = default_usdc_mint(network)
            .ok_or_else(|| SchemeServerError::UnknownNetwork(network.to_owned()))?;
        let amount = if let Some(text) = price.as_str() {
            let cleaned = text.trim().trim_start_matches('$').trim();
            cleaned.parse::<Decimal>().map_err(|e| {
                SchemeServerError::InvalidPrice(format!("invalid money string '{text}': {e}"))
            })?
        } else if let Some(number) = price.as_f64() {
            Decimal::try_from(number).map_err(|e| {
                SchemeServerError::InvalidPrice(format!("invalid price {number}: {e}"))
            })?
        } else {
            return Err(SchemeServerError::InvalidPrice(price.to_string()));
        };
        let scale = Decimal::from(10u64.pow(u32::from(USDC_DECIMALS)));
        let atomic = (amount * scale).trunc().to_u64().ok_or_else(|| {
            SchemeServerError::InvalidPrice(format!("amount out of range: {amount}"))
        })?;
        Ok(AssetAmount {
            amount: atomic.to_string(),
            asset: mint.to_owned(),
            extra: None,
        })
    }

    fn enhance_requirements(
        &self,
        mut base: v2::PaymentRequirements,
        supported: &SupportedPaymentKind,
        _extensions: &[String],
    ) -> v2::PaymentRequirements {
        // Default asset when the route did not name one.
        if base.asset.is_empty()
            && let Some(mint) = default_usdc_mint(&base.network.to_string())
        {
            base.asset = mint.to_owned();
        }

        // The fee payer only the facilitator knows.
        let fee_payer = supported
            .extra
            .as_ref()
            .and_then(|extra| extra.get("feePayer").cloned());
        if let Some(fee_payer) = fee_payer {
            let mut extra = base
                .extra
                .take()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default();
            extra.entry("feePayer".to_owned()).or_insert(fee_payer);
            base.extra = Some(Value::Object(extra));
        }
        base
    }
}
