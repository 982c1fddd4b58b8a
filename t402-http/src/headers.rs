//! Base64 JSON codecs for t402 payment headers.
//!
//! Payment payloads, 402 bodies, and settlement results travel in HTTP
//! headers as base64-encoded JSON.

use t402::encoding::Base64Bytes;
use t402::proto::{SettleResponse, v1, v2};

/// Errors from header encoding and decoding.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HeaderCodecError {
    /// The header value is not valid base64.
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A decoded payment payload, tagged by protocol version, with the exact
/// bytes that were decoded.
///
/// The raw bytes are kept so the resource server can forward them to the
/// facilitator without re-marshalling.
#[derive(Debug, Clone)]
pub enum DecodedPayment {
    /// A V2 payload and its raw JSON bytes.
    V2(Box<serde_json::value::RawValue>, Box<v2::PaymentPayload>),
    /// A V1 payload and its raw JSON bytes.
    V1(Box<serde_json::value::RawValue>, Box<v1::PaymentPayload>),
}

/// Decodes a `Payment-Signature` / `X-Payment` header value into a
/// version-tagged payload.
///
/// # Errors
///
/// Returns [`HeaderCodecError`] on base64 or JSON decode failure.
pub fn decode_payment_header(header_value: &[u8]) -> Result<DecodedPayment, HeaderCodecError> {
    let bytes = Base64Bytes::from(header_value).decode()?;
    let raw: Box<serde_json::value::RawValue> = serde_json::from_slice(&bytes)?;
    // Try V2 first: its version marker rejects V1 payloads and vice versa.
    if let Ok(payload) = serde_json::from_str::<v2::PaymentPayload>(raw.get()) {
        return Ok(DecodedPayment::V2(raw, Box::new(payload)));
    }
    let payload = serde_json::from_str::<v1::PaymentPayload>(raw.get())?;
    Ok(DecodedPayment::V1(raw, Box::new(payload)))
}

/// Encodes a payment payload (any JSON bytes) for the payment header.
#[must_use]
pub fn encode_payment_header(payload_json: &[u8]) -> String {
    Base64Bytes::encode(payload_json).to_string()
}

/// Encodes a [`SettleResponse`] for the `Payment-Response` header.
///
/// # Errors
///
/// Returns [`HeaderCodecError`] if serialization fails.
pub fn encode_payment_response(response: &SettleResponse) -> Result<String, HeaderCodecError> {
    let json = serde_json::to_vec(response)?;
    Ok(Base64Bytes::encode(&json).to_string())
}

/// Decodes a `Payment-Response` header value.
///
/// # Errors
///
/// Returns [`HeaderCodecError`] on base64 or JSON decode failure.
pub fn decode_payment_response(header_value: &[u8]) -> Result<SettleResponse, HeaderCodecError> {
    let bytes = Base64Bytes::from(header_value).decode()?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_v2_payment_header() {
        let payload = serde_json::json!({
            "t402Version": 2,
            "accepted": {
                "scheme": "exact",
                "network": "eip155:84532",
                "amount": "1000",
                "payTo": "0xR",
                "maxTimeoutSeconds": 300,
                "asset": "0xA",
            },
            "payload": { "signature": "0xsig" },
        });
        let encoded = encode_payment_header(&serde_json::to_vec(&payload).unwrap());
        match decode_payment_header(encoded.as_bytes()).unwrap() {
            DecodedPayment::V2(raw, parsed) => {
                assert_eq!(parsed.accepted.scheme, "exact");
                // Raw bytes are the exact decoded bytes.
                assert_eq!(
                    serde_json::from_str::<serde_json::Value>(raw.get()).unwrap(),
                    payload
                );
            }
            DecodedPayment::V1(..) => panic!("expected V2"),
        }
    }

    #[test]
    fn decodes_v1_payment_header() {
        let payload = serde_json::json!({
            "t402Version": 1,
            "scheme": "exact",
            "network": "base-sepolia",
            "payload": { "signature": "0xsig" },
        });
        let encoded = encode_payment_header(&serde_json::to_vec(&payload).unwrap());
        match decode_payment_header(encoded.as_bytes()).unwrap() {
            DecodedPayment::V1(_, parsed) => assert_eq!(parsed.network, "base-sepolia"),
            DecodedPayment::V2(..) => panic!("expected V1"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_payment_header(b"not-base64!!").is_err());
        let encoded = encode_payment_header(b"{\"nope\":true}");
        assert!(decode_payment_header(encoded.as_bytes()).is_err());
    }

    #[test]
    fn settle_response_roundtrip() {
        let response = SettleResponse::Success {
            payer: "0xPayer".to_owned(),
            transaction: "0xtx".to_owned(),
            network: "eip155:84532".to_owned(),
        };
        let encoded = encode_payment_response(&response).unwrap();
        let back = decode_payment_response(encoded.as_bytes()).unwrap();
        assert_eq!(back, response);
    }
}
