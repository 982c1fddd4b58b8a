//! Axum handlers for the facilitator HTTP surface.
//!
//! Status policy: structured verification and settlement failures are
//! normal protocol answers and return 200 with `isValid:false` /
//! `success:false` bodies. Malformed request bodies are rejected by the
//! JSON extractor with 4xx. Only unexpected internal errors (RPC
//! unreachable, hook panics surfaced as errors) return 5xx.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use t402::facilitator::Facilitator;
use t402::proto;

/// Builds the facilitator router over any [`Facilitator`] implementation.
///
/// Endpoints:
/// - `POST /verify` — verify a payment payload against requirements
/// - `POST /settle` — settle an accepted payment on-chain
/// - `GET /supported` — list supported payment kinds and signers
/// - `GET /health` — liveness probe
pub fn facilitator_router<A>(state: Arc<A>) -> Router
where
    A: Facilitator + 'static,
{
    Router::new()
        .route("/verify", post(post_verify::<A>))
        .route("/settle", post(post_settle::<A>))
        .route("/supported", get(get_supported::<A>))
        .route("/health", get(get_health))
        .with_state(state)
}

/// `GET /health` — liveness probe.
async fn get_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /supported` — the union of every registered handler's kinds.
async fn get_supported<A>(State(facilitator): State<Arc<A>>) -> Response
where
    A: Facilitator,
{
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(supported)).into_response(),
        Err(error) => internal_error(&error),
    }
}

/// `POST /verify` — verifies a payment payload.
async fn post_verify<A>(
    State(facilitator): State<Arc<A>>,
    Json(body): Json<proto::VerifyRequest>,
) -> Response
where
    A: Facilitator,
{
    match facilitator.verify(body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %error, "verification failed unexpectedly");
            internal_error(&error)
        }
    }
}

/// `POST /settle` — settles an accepted payment on-chain.
async fn post_settle<A>(
    State(facilitator): State<Arc<A>>,
    Json(body): Json<proto::SettleRequest>,
) -> Response
where
    A: Facilitator,
{
    match facilitator.settle(body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %error, "settlement failed unexpectedly");
            internal_error(&error)
        }
    }
}

fn internal_error(error: &dyn std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use t402::facilitator::{BoxFuture, FacilitatorError};
    use t402::proto::VerificationError;
    use tower::ServiceExt;

    struct StubFacilitator {
        fail_unexpectedly: bool,
    }

    impl Facilitator for StubFacilitator {
        fn verify(
            &self,
            _request: proto::VerifyRequest,
        ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
            let fail = self.fail_unexpectedly;
            Box::pin(async move {
                if fail {
                    Err(FacilitatorError::Onchain("rpc unreachable".to_owned()))
                } else {
                    Ok(proto::VerifyResponse::invalid(
                        None,
                        VerificationError::InsufficientAmount
                            .reason()
                            .to_string(),
                    ))
                }
            })
        }

        fn settle(
            &self,
            _request: proto::SettleRequest,
        ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
            Box::pin(async {
                Ok(proto::SettleResponse::Error {
                    reason: "Payment verification expired".to_owned(),
                    network: "t402:cash".to_owned(),
                    payer: None,
                })
            })
        }

        fn supported(
            &self,
        ) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
            Box::pin(async { Ok(proto::SupportedResponse::default()) })
        }
    }

    fn request(path: &str, body: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_owned()))
            .unwrap()
    }

    const VALID_BODY: &str =
        r#"{"t402Version":2,"paymentPayload":{},"paymentRequirements":{}}"#;

    #[tokio::test]
    async fn structured_invalid_is_200() {
        let app = facilitator_router(Arc::new(StubFacilitator {
            fail_unexpectedly: false,
        }));
        let response = app.oneshot(request("/verify", VALID_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["isValid"], false);
        assert_eq!(body["invalidReason"], "insufficient_amount");
    }

    #[tokio::test]
    async fn hook_aborted_settlement_is_200_with_error_reason() {
        let app = facilitator_router(Arc::new(StubFacilitator {
            fail_unexpectedly: false,
        }));
        let response = app.oneshot(request("/settle", VALID_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errorReason"], "Payment verification expired");
    }

    #[tokio::test]
    async fn malformed_body_is_4xx() {
        let app = facilitator_router(Arc::new(StubFacilitator {
            fail_unexpectedly: false,
        }));
        let response = app
            .oneshot(request("/verify", "{\"not\": \"a request\""))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn unexpected_error_is_500() {
        let app = facilitator_router(Arc::new(StubFacilitator {
            fail_unexpectedly: true,
        }));
        let response = app.oneshot(request("/verify", VALID_BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
