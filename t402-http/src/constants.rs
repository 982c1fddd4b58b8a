//! HTTP constants for the t402 protocol.

/// Header carrying a V2 payment payload (client → server).
pub const PAYMENT_SIGNATURE_HEADER: &str = "Payment-Signature";

/// Legacy V1 header carrying a payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-Payment";

/// Advisory flag header on 402 responses (server → client), value `1`.
pub const PAYMENT_REQUIRED_HEADER: &str = "Payment-Required";

/// Header carrying the base64 settlement result (server → client).
pub const PAYMENT_RESPONSE_HEADER: &str = "Payment-Response";

/// CORS header exposing the custom payment headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
