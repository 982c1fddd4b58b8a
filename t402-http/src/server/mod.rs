//! Tower middleware gating routes on t402 payment.
//!
//! [`PaymentGateLayer`] wraps an inner service and runs the per-request
//! pipeline: route matching → requirement assembly → 402 emission → payload
//! verification → inner handler → conditional settlement → response-header
//! injection.
//!
//! Two contracts are hard:
//!
//! - A failed resource never charges the client: when the inner handler
//!   answers with status ≥ 400, settlement is skipped and the response is
//!   returned as-is.
//! - The `Payment-Response` header is attached to the buffered response
//!   before any bytes reach the wire.
//!
//! The middleware is re-entrant; per-request state lives on the stack of
//! its future. The only shared state is the immutable route table and the
//! initialized [`ResourceServer`].

pub mod facilitator_client;
pub mod types;

pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use types::{PaymentOption, RouteConfig, RouteValidationError};

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use http::{Request, Response, StatusCode, header};
use serde_json::json;
use tower::{Layer, Service};

use t402::networks::NetworkRegistry;
use t402::proto::{ErrorReason, v1, v2};
use t402::server::ResourceServer;

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER,
    PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER,
};
use crate::headers::{DecodedPayment, decode_payment_header, encode_payment_response};
use types::CompiledRoute;

/// Route configuration map: pattern → [`RouteConfig`].
///
/// Keys are route patterns like `"GET /weather"`, `"/api/*"`, or `"*"`.
pub type RoutesConfig = HashMap<String, RouteConfig>;

/// Renders the paywall page for browser clients (`Accept: text/html`).
///
/// Real template packs are external; the built-in fallback is a minimal
/// page naming the price options.
pub type PaywallRenderer = Arc<dyn Fn(&v2::PaymentRequired) -> String + Send + Sync>;

fn default_paywall(required: &v2::PaymentRequired) -> String {
    let mut options = String::new();
    for accept in &required.accepts {
        options.push_str(&format!(
            "<li>{} {} on {} to {}</li>",
            accept.amount, accept.asset, accept.network, accept.pay_to
        ));
    }
    let description = required
        .resource
        .as_ref()
        .map(|r| r.description.clone())
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html><html><head><title>Payment Required</title></head>\
         <body><h1>402 Payment Required</h1><p>{description}</p><ul>{options}</ul></body></html>"
    )
}

struct PaymentGateShared {
    server: Arc<ResourceServer>,
    routes: Vec<CompiledRoute>,
    networks: NetworkRegistry,
    paywall: PaywallRenderer,
}

/// Tower [`Layer`] adding t402 payment gating to an inner service.
#[derive(Clone)]
pub struct PaymentGateLayer {
    shared: Arc<PaymentGateShared>,
}

impl std::fmt::Debug for PaymentGateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer")
            .field("routes", &self.shared.routes.len())
            .finish_non_exhaustive()
    }
}

impl PaymentGateLayer {
    /// Creates a gate over an initialized [`ResourceServer`], failing loud
    /// when a route references a (scheme, network) pair no facilitator
    /// supports.
    ///
    /// # Errors
    ///
    /// Returns every unsupported pair; treat this as a startup
    /// misconfiguration.
    pub fn try_new(
        server: Arc<ResourceServer>,
        routes: RoutesConfig,
    ) -> Result<Self, Vec<RouteValidationError>> {
        let compiled: Vec<CompiledRoute> = routes
            .into_iter()
            .map(|(pattern, config)| CompiledRoute::compile(&pattern, config))
            .collect();

        let mut errors = Vec::new();
        for route in &compiled {
            for option in &route.config.accepts {
                if !server.supports(&option.scheme, &option.network) {
                    errors.push(RouteValidationError {
                        route_pattern: route.pattern.clone(),
                        scheme: option.scheme.clone(),
                        network: option.network.clone(),
                    });
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            shared: Arc::new(PaymentGateShared {
                server,
                routes: compiled,
                networks: NetworkRegistry::new(),
                paywall: Arc::new(default_paywall),
            }),
        })
    }

    /// Registers V1 legacy network names so `X-Payment` payloads resolve.
    #[must_use]
    pub fn with_networks(mut self, networks: NetworkRegistry) -> Self {
        let shared = Arc::get_mut(&mut self.shared);
        match shared {
            Some(shared) => shared.networks = networks,
            None => {
                self.shared = Arc::new(PaymentGateShared {
                    server: Arc::clone(&self.shared.server),
                    routes: self.shared.routes.clone(),
                    networks,
                    paywall: Arc::clone(&self.shared.paywall),
                });
            }
        }
        self
    }

    /// Replaces the paywall renderer used for `Accept: text/html` clients.
    #[must_use]
    pub fn with_paywall(mut self, renderer: PaywallRenderer) -> Self {
        let shared = Arc::get_mut(&mut self.shared);
        match shared {
            Some(shared) => shared.paywall = renderer,
            None => {
                self.shared = Arc::new(PaymentGateShared {
                    server: Arc::clone(&self.shared.server),
                    routes: self.shared.routes.clone(),
                    networks: self.shared.networks.clone(),
                    paywall: renderer,
                });
            }
        }
        self
    }
}

impl<S> Layer<S> for PaymentGateLayer {
    type Service = PaymentGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Tower [`Service`] enforcing t402 payment requirements.
#[derive(Clone)]
pub struct PaymentGateService<S> {
    inner: S,
    shared: Arc<PaymentGateShared>,
}

impl<S> std::fmt::Debug for PaymentGateService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateService").finish_non_exhaustive()
    }
}

impl<S> Service<Request<Body>> for PaymentGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let inner = self.inner.clone();
        Box::pin(async move { Ok(handle_request(&shared, inner, req).await) })
    }
}

async fn handle_request<S>(
    shared: &PaymentGateShared,
    mut inner: S,
    req: Request<Body>,
) -> Response<Body>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>,
{
    let method = req.method().as_str().to_uppercase();
    let path = req.uri().path().to_owned();

    // Most specific route wins: exact path, then longest wildcard prefix,
    // then "*".
    let route = shared
        .routes
        .iter()
        .filter(|route| route.matches(&method, &path))
        .max_by_key(|route| route.specificity());
    let Some(route) = route else {
        // No payment required for this route.
        return match inner.call(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
    };

    let mut accepts = Vec::with_capacity(route.config.accepts.len());
    for option in &route.config.accepts {
        match shared.server.build_requirements(&option.into()) {
            Ok(requirements) => accepts.push(requirements),
            Err(e) => {
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({ "error": format!("failed to build payment requirements: {e}") }),
                );
            }
        }
    }

    let resource = resource_info(route, &req);
    let extensions = {
        let mut extensions = t402::proto::Extensions::new();
        for option in &route.config.accepts {
            if let Some(declared) = &option.extensions {
                extensions.extend(declared.clone());
            }
        }
        (!extensions.is_empty()).then_some(extensions)
    };
    let wants_html = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    let payment_header = req
        .headers()
        .get(PAYMENT_SIGNATURE_HEADER)
        .or_else(|| req.headers().get(X_PAYMENT_HEADER))
        .map(|value| value.as_bytes().to_vec());

    let Some(payment_header) = payment_header else {
        let body = shared.server.create_payment_required(
            accepts,
            Some(resource),
            None,
            extensions.clone(),
        );
        return payment_required_response(shared, &body, wants_html);
    };

    let decoded = match decode_payment_header(&payment_header) {
        Ok(decoded) => decoded,
        Err(_) => {
            let body = shared.server.create_payment_required(
                accepts,
                Some(resource),
                Some(ErrorReason::InvalidPayload.to_string()),
                extensions.clone(),
            );
            return payment_required_response(shared, &body, wants_html);
        }
    };

    // Select the offered requirement matching the payload and normalize to
    // the raw forms the facilitator receives.
    let matched = match &decoded {
        DecodedPayment::V2(raw, payload) => shared
            .server
            .find_matching(&accepts, &payload.accepted)
            .map(|selected| MatchedPayment {
                t402_version: 2,
                payload_raw: raw.clone(),
                requirements_raw: serde_json::value::to_raw_value(selected).ok(),
                scheme: selected.scheme.clone(),
                network: selected.network.to_string(),
            }),
        DecodedPayment::V1(raw, payload) => {
            let chain_id = shared.networks.chain_id_by_name(&payload.network).cloned();
            chain_id.and_then(|chain_id| {
                let selected = accepts.iter().find(|offered| {
                    offered.scheme == payload.scheme && offered.network == chain_id
                })?;
                let legacy = v1_requirements(selected, &payload.network, &resource);
                Some(MatchedPayment {
                    t402_version: 1,
                    payload_raw: raw.clone(),
                    requirements_raw: serde_json::value::to_raw_value(&legacy).ok(),
                    scheme: selected.scheme.clone(),
                    network: selected.network.to_string(),
                })
            })
        }
    };
    let Some(matched) = matched else {
        let body = shared.server.create_payment_required(
            accepts,
            Some(resource),
            Some(ErrorReason::NoMatchingRequirement.to_string()),
            extensions.clone(),
        );
        return payment_required_response(shared, &body, wants_html);
    };
    let Some(requirements_raw) = matched.requirements_raw else {
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": "failed to serialize payment requirements" }),
        );
    };

    // Verify before touching the protected handler.
    let verification = shared
        .server
        .verify_raw(
            matched.t402_version,
            &matched.payload_raw,
            &requirements_raw,
            &matched.scheme,
            &matched.network,
        )
        .await;
    let invalid_reason = match verification {
        Ok(response) if response.is_valid() => None,
        Ok(response) => Some(
            response
                .invalid_reason()
                .unwrap_or("verification_failed")
                .to_owned(),
        ),
        Err(e) => Some(e.to_string()),
    };
    if let Some(reason) = invalid_reason {
        let body = shared
            .server
            .create_payment_required(accepts, Some(resource), Some(reason), extensions);
        return payment_required_response(shared, &body, wants_html);
    }

    // Run the protected handler, buffering its response.
    let response = match inner.call(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    // A failed resource must not charge the client.
    if response.status().is_client_error() || response.status().is_server_error() {
        return response;
    }

    let settlement = shared
        .server
        .settle_raw(
            matched.t402_version,
            &matched.payload_raw,
            &requirements_raw,
            &matched.scheme,
            &matched.network,
        )
        .await;
    match settlement {
        Ok(settlement) if settlement.is_success() => {
            match encode_payment_response(&settlement) {
                Ok(encoded) => {
                    let mut response = response;
                    if let Ok(value) = http::HeaderValue::from_str(&encoded) {
                        response
                            .headers_mut()
                            .insert(PAYMENT_RESPONSE_HEADER, value);
                        response.headers_mut().insert(
                            ACCESS_CONTROL_EXPOSE_HEADERS,
                            http::HeaderValue::from_static("Payment-Response"),
                        );
                    }
                    response
                }
                Err(e) => settlement_failed_response(&e.to_string()),
            }
        }
        Ok(settlement) => settlement_failed_response(
            settlement.error_reason().unwrap_or("settlement_failed"),
        ),
        Err(e) => settlement_failed_response(&e.to_string()),
    }
}

struct MatchedPayment {
    t402_version: u8,
    payload_raw: Box<serde_json::value::RawValue>,
    requirements_raw: Option<Box<serde_json::value::RawValue>>,
    scheme: String,
    network: String,
}

/// Projects a selected V2 requirement into the V1 wire shape for legacy
/// `X-Payment` clients.
fn v1_requirements(
    selected: &v2::PaymentRequirements,
    network_name: &str,
    resource: &v2::ResourceInfo,
) -> v1::PaymentRequirements {
    v1::PaymentRequirements {
        scheme: selected.scheme.clone(),
        network: network_name.to_owned(),
        max_amount_required: selected.amount.clone(),
        resource: resource.url.clone(),
        description: resource.description.clone(),
        mime_type: resource.mime_type.clone(),
        output_schema: None,
        pay_to: selected.pay_to.clone(),
        max_timeout_seconds: selected.max_timeout_seconds,
        asset: selected.asset.clone(),
        extra: selected.extra.clone(),
    }
}

fn resource_info(route: &CompiledRoute, req: &Request<Body>) -> v2::ResourceInfo {
    let url = route.config.resource.clone().unwrap_or_else(|| {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}{}", req.uri().path())
    });
    v2::ResourceInfo {
        description: route.config.description.clone().unwrap_or_default(),
        mime_type: route
            .config
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/json".to_owned()),
        url,
    }
}

fn payment_required_response(
    shared: &PaymentGateShared,
    body: &v2::PaymentRequired,
    wants_html: bool,
) -> Response<Body> {
    let builder = Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(PAYMENT_REQUIRED_HEADER, "1")
        .header(ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_REQUIRED_HEADER);
    let response = if wants_html {
        builder
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from((shared.paywall)(body)))
    } else {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::to_vec(body).unwrap_or_default(),
            ))
    };
    response.unwrap_or_else(|_| {
        Response::new(Body::from("402 Payment Required"))
    })
}

fn settlement_failed_response(details: &str) -> Response<Body> {
    json_response(
        StatusCode::PAYMENT_REQUIRED,
        &json!({ "error": "Settlement failed", "details": details }),
    )
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    use t402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
    use t402::proto;
    use t402::scheme::{AssetAmount, SchemeServer, SchemeServerError};

    struct GateFacilitator {
        verify_response: proto::VerifyResponse,
        settle_response: proto::SettleResponse,
        settle_calls: Arc<AtomicUsize>,
    }

    impl GateFacilitator {
        fn happy() -> Self {
            Self {
                verify_response: proto::VerifyResponse::valid("0xPayer".to_owned()),
                settle_response: proto::SettleResponse::Success {
                    payer: "0xPayer".to_owned(),
                    transaction: "0xtx".to_owned(),
                    network: "eip155:84532".to_owned(),
                },
                settle_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Facilitator for GateFacilitator {
        fn verify(
            &self,
            _request: proto::VerifyRequest,
        ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
            let response = self.verify_response.clone();
            Box::pin(async move { Ok(response) })
        }

        fn settle(
            &self,
            _request: proto::SettleRequest,
        ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            let response = self.settle_response.clone();
            Box::pin(async move { Ok(response) })
        }

        fn supported(
            &self,
        ) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
            Box::pin(async {
                Ok(proto::SupportedResponse {
                    kinds: vec![proto::SupportedPaymentKind {
                        t402_version: 2,
                        scheme: "exact".to_owned(),
                        network: "eip155:84532".to_owned(),
                        asset: None,
                        extra: None,
                        extensions: None,
                    }],
                    extensions: vec![],
                    signers: std::collections::HashMap::new(),
                })
            })
        }
    }

    struct PassthroughPrice;

    impl SchemeServer for PassthroughPrice {
        fn scheme(&self) -> &str {
            "exact"
        }

        fn parse_price(
            &self,
            price: &serde_json::Value,
            _network: &str,
        ) -> Result<AssetAmount, SchemeServerError> {
            Ok(AssetAmount {
                asset: "0xAsset".to_owned(),
                amount: price.as_str().unwrap_or("0").to_owned(),
                extra: None,
            })
        }

        fn enhance_requirements(
            &self,
            base: v2::PaymentRequirements,
            _supported: &proto::SupportedPaymentKind,
            _extensions: &[String],
        ) -> v2::PaymentRequirements {
            base
        }
    }

    async fn gate(facilitator: GateFacilitator) -> PaymentGateLayer {
        let mut server = t402::server::ResourceServer::new()
            .with_facilitator(Arc::new(facilitator))
            .with_scheme("eip155:*", Arc::new(PassthroughPrice));
        server.initialize().await.unwrap();

        let mut routes = RoutesConfig::new();
        routes.insert(
            "GET /api/data".to_owned(),
            RouteConfig::single(PaymentOption {
                scheme: "exact".to_owned(),
                pay_to: "0xRecipient".to_owned(),
                price: serde_json::json!("1000"),
                network: "eip155:84532".to_owned(),
                max_timeout_seconds: None,
                extensions: None,
            })
            .with_description("data feed")
            .with_resource("http://api.example/api/data"),
        );
        PaymentGateLayer::try_new(Arc::new(server), routes).unwrap()
    }

    #[derive(Clone)]
    struct StaticService(StatusCode, &'static str);

    impl tower::Service<Request<Body>> for StaticService {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response<Body>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            let response = Response::builder()
                .status(self.0)
                .body(Body::from(self.1))
                .unwrap();
            std::future::ready(Ok(response))
        }
    }

    fn inner_ok() -> StaticService {
        StaticService(StatusCode::OK, "protected")
    }

    fn payment_header() -> String {
        let payload = serde_json::json!({
            "t402Version": 2,
            "accepted": {
                "scheme": "exact",
                "network": "eip155:84532",
                "amount": "1000",
                "payTo": "0xRecipient",
                "maxTimeoutSeconds": 300,
                "asset": "0xAsset",
            },
            "payload": { "signature": "0xsig" },
        });
        crate::headers::encode_payment_header(&serde_json::to_vec(&payload).unwrap())
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unpaid_request_gets_402_idempotently() {
        let layer = gate(GateFacilitator::happy()).await;
        let service = layer.layer(inner_ok());

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let request = Request::builder()
                .method("GET")
                .uri("/api/data")
                .body(Body::empty())
                .unwrap();
            let response = service.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
            assert_eq!(
                response.headers().get(PAYMENT_REQUIRED_HEADER).unwrap(),
                "1"
            );
            bodies.push(body_json(response).await);
        }
        // Repeated unpaid requests answer with identical bodies.
        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0]["t402Version"], 2);
        assert_eq!(bodies[0]["accepts"][0]["amount"], "1000");
        assert_eq!(bodies[0]["resource"]["url"], "http://api.example/api/data");
    }

    #[tokio::test]
    async fn unmatched_route_passes_through() {
        let layer = gate(GateFacilitator::happy()).await;
        let service = layer.layer(inner_ok());
        let request = Request::builder()
            .method("GET")
            .uri("/free")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn paid_request_settles_and_injects_header() {
        let facilitator = GateFacilitator::happy();
        let settle_calls = Arc::clone(&facilitator.settle_calls);
        let layer = gate(facilitator).await;
        let service = layer.layer(inner_ok());

        let request = Request::builder()
            .method("GET")
            .uri("/api/data")
            .header(PAYMENT_SIGNATURE_HEADER, payment_header())
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);

        let header = response.headers().get(PAYMENT_RESPONSE_HEADER).unwrap();
        let settlement =
            crate::headers::decode_payment_response(header.as_bytes()).unwrap();
        assert!(settlement.is_success());
    }

    #[tokio::test]
    async fn handler_error_skips_settlement() {
        let facilitator = GateFacilitator::happy();
        let settle_calls = Arc::clone(&facilitator.settle_calls);
        let layer = gate(facilitator).await;
        let failing_inner =
            StaticService(StatusCode::INTERNAL_SERVER_ERROR, "{\"error\":\"internal\"}");
        let service = layer.layer(failing_inner);

        let request = Request::builder()
            .method("GET")
            .uri("/api/data")
            .header(PAYMENT_SIGNATURE_HEADER, payment_header())
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        // The handler response passes through unchanged and the client is
        // never charged.
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_verification_is_402_with_reason() {
        let facilitator = GateFacilitator {
            verify_response: proto::VerifyResponse::invalid(
                None,
                "insufficient_amount".to_owned(),
            ),
            ..GateFacilitator::happy()
        };
        let layer = gate(facilitator).await;
        let service = layer.layer(inner_ok());

        let request = Request::builder()
            .method("GET")
            .uri("/api/data")
            .header(PAYMENT_SIGNATURE_HEADER, payment_header())
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_amount");
    }

    #[tokio::test]
    async fn settlement_failure_discards_handler_response() {
        let facilitator = GateFacilitator {
            settle_response: proto::SettleResponse::Error {
                reason: "settlement_reverted".to_owned(),
                network: "eip155:84532".to_owned(),
                payer: None,
            },
            ..GateFacilitator::happy()
        };
        let layer = gate(facilitator).await;
        let service = layer.layer(inner_ok());

        let request = Request::builder()
            .method("GET")
            .uri("/api/data")
            .header(PAYMENT_SIGNATURE_HEADER, payment_header())
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Settlement failed");
        assert_eq!(body["details"], "settlement_reverted");
    }

    #[tokio::test]
    async fn paywall_renders_for_html_clients() {
        let layer = gate(GateFacilitator::happy()).await;
        let service = layer.layer(inner_ok());
        let request = Request::builder()
            .method("GET")
            .uri("/api/data")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));
    }

    #[tokio::test]
    async fn unsupported_route_fails_startup_validation() {
        let mut server = t402::server::ResourceServer::new()
            .with_facilitator(Arc::new(GateFacilitator::happy()))
            .with_scheme("eip155:*", Arc::new(PassthroughPrice));
        server.initialize().await.unwrap();
        let mut routes = RoutesConfig::new();
        routes.insert(
            "GET /api".to_owned(),
            RouteConfig::single(PaymentOption {
                scheme: "exact".to_owned(),
                pay_to: "R".to_owned(),
                price: serde_json::json!("1"),
                network: "solana:unsupported".to_owned(),
                max_timeout_seconds: None,
                extensions: None,
            }),
        );
        let errors = PaymentGateLayer::try_new(Arc::new(server), routes).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].network, "solana:unsupported");
    }
}
