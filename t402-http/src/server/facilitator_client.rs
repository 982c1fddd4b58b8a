//! HTTP client for a remote t402 facilitator.
//!
//! [`FacilitatorClient`] speaks the facilitator wire protocol — `POST
//! /verify`, `POST /settle`, `GET /supported` — and implements
//! [`t402::facilitator::Facilitator`] so it plugs into the resource-server
//! core interchangeably with a local facilitator.
//!
//! The `/supported` response is cached with a TTL (default ten minutes)
//! because requirement assembly consults it on every 402.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

use t402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use t402::proto::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

/// TTL cache state for [`SupportedResponse`].
#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: Instant,
}

/// A TTL cache for the `/supported` endpoint response.
///
/// Clones start with an empty, independent cache.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached response if still fresh.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cached = guard.as_ref()?;
        (Instant::now() < cached.expires_at).then(|| cached.response.clone())
    }

    /// Stores a response with the configured TTL.
    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Clears the cache.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// Errors from talking to a remote facilitator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorClientError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport failure.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body did not deserialize.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator answered with an unexpected status.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
}

impl From<FacilitatorClientError> for FacilitatorError {
    fn from(value: FacilitatorClientError) -> Self {
        Self::Other(Box::new(value))
    }
}

/// HTTP client for a remote t402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
    supported_cache: SupportedCache,
}

impl FacilitatorClient {
    /// Default TTL for the `/supported` cache (ten minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Constructs a client from a base URL, deriving the endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |segment: &str, context: &'static str| {
            base_url
                .join(segment)
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        Ok(Self {
            verify_url: join("./verify", "Failed to construct ./verify URL")?,
            settle_url: join("./settle", "Failed to construct ./settle URL")?,
            supported_url: join("./supported", "Failed to construct ./supported URL")?,
            base_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// Returns the base URL of the facilitator.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the `/supported` cache TTL.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    /// Disables `/supported` caching.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends `POST /verify`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    /// Structured invalid responses arrive as `Ok` values.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends `POST /settle`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    /// Structured failures arrive as `Ok` values.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Sends `GET /supported`, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn supported_uncached(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        let mut req = self.client.get(self.supported_url.clone());
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let context = "GET /supported";
        let response = req
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http { context, source })?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            });
        }
        response
            .json::<SupportedResponse>()
            .await
            .map_err(|source| FacilitatorClientError::JsonDeserialization { context, source })
    }

    /// Sends `GET /supported`, serving cached responses within the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] on transport or decode failure.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(cached) = self.supported_cache.get().await {
            return Ok(cached);
        }
        let response = self.supported_uncached().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http { context, source })?;
        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|source| FacilitatorClientError::JsonDeserialization { context, source })
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize to a single trailing slash so ./ joins behave.
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl Facilitator for FacilitatorClient {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move { Ok(Self::verify(self, &request).await?) })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move { Ok(Self::settle(self, &request).await?) })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move { Ok(Self::supported(self).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use t402::proto::SupportedPaymentKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn supported_body() -> SupportedResponse {
        SupportedResponse {
            kinds: vec![SupportedPaymentKind {
                t402_version: 2,
                scheme: "exact".to_owned(),
                network: "eip155:84532".to_owned(),
                asset: None,
                extra: None,
                extensions: None,
            }],
            extensions: vec![],
            signers: std::collections::HashMap::new(),
        }
    }

    #[tokio::test]
    async fn verify_posts_raw_subobjects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(serde_json::json!({
                "t402Version": 2,
                "paymentPayload": { "keep": "me" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "isValid": true,
                "payer": "0xPayer",
            })))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let request = VerifyRequest::assemble(
            2,
            &serde_json::json!({"keep": "me"}),
            &serde_json::json!({"scheme": "exact", "network": "eip155:84532"}),
        )
        .unwrap();
        let response = client.verify(&request).await.unwrap();
        assert_eq!(response, VerifyResponse::valid("0xPayer".to_owned()));
    }

    #[tokio::test]
    async fn settle_returns_structured_failure_as_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorReason": "settlement_reverted",
                "network": "eip155:84532",
            })))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let request = VerifyRequest::assemble(
            2,
            &serde_json::json!({}),
            &serde_json::json!({}),
        )
        .unwrap();
        let response = client.settle(&request).await.unwrap();
        assert_eq!(response.error_reason(), Some("settlement_reverted"));
    }

    #[tokio::test]
    async fn supported_is_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let first = client.supported().await.unwrap();
        let second = client.supported().await.unwrap();
        assert_eq!(first.kinds.len(), 1);
        assert_eq!(second.kinds.len(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .expect(2)
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str())
            .unwrap()
            .without_supported_cache();
        client.supported().await.unwrap();
        client.supported().await.unwrap();
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = FacilitatorClient::try_from(server.uri().as_str()).unwrap();
        let request = VerifyRequest::assemble(
            2,
            &serde_json::json!({}),
            &serde_json::json!({}),
        )
        .unwrap();
        let error = client.verify(&request).await.unwrap_err();
        assert!(matches!(
            error,
            FacilitatorClientError::HttpStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
