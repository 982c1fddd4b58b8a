//! Client-side payment handling for reqwest.
//!
//! [`T402Client`] is a `reqwest-middleware` layer that answers 402
//! responses automatically: it parses the payment requirements, selects an
//! option a registered [`SchemeClient`] can satisfy (after policy
//! filtering), signs the payment, and retries the request once with the
//! payment header attached.

use http::{Extensions, HeaderMap, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;

use t402::proto::{self, v1, v2};
use t402::scheme::{SchemeClient, SchemeClientError};

use crate::constants::{PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER};
use crate::headers::encode_payment_header;

/// Errors from the client payment middleware.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum T402ClientError {
    /// The 402 response body could not be parsed.
    #[error("Invalid 402 response: {0}")]
    Parse(String),
    /// No registered scheme client can satisfy any offered option.
    #[error("No matching payment option")]
    NoMatchingPaymentOption,
    /// The request body is not cloneable, so it cannot be retried.
    #[error("Request cannot be cloned for payment retry")]
    RequestNotCloneable,
    /// Payload construction failed.
    #[error(transparent)]
    Scheme(#[from] SchemeClientError),
    /// The signed payload is not a valid header value.
    #[error("Signed payload is not a valid header value")]
    InvalidHeaderValue,
}

/// One payable option: an offered requirement paired with a client that
/// can satisfy it.
pub struct PaymentCandidate {
    /// The protocol version of the offer.
    pub t402_version: u8,
    /// The payment scheme.
    pub scheme: String,
    /// The network identifier.
    pub network: String,
    /// The required amount, as offered.
    pub amount: Option<String>,
    /// The raw requirement object.
    pub requirements: serde_json::Value,
    client: Arc<dyn SchemeClient>,
}

impl std::fmt::Debug for PaymentCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentCandidate")
            .field("t402_version", &self.t402_version)
            .field("scheme", &self.scheme)
            .field("network", &self.network)
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}

/// Chooses one candidate from the filtered list.
pub trait PaymentSelector: Send + Sync {
    /// Returns the preferred candidate, or `None` to refuse payment.
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate>;
}

/// Default selector: the first candidate in server preference order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl PaymentSelector for FirstMatch {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates.first()
    }
}

/// Filters candidates before selection.
pub trait PaymentPolicy: Send + Sync {
    /// Returns `true` when the candidate is acceptable.
    fn allows(&self, candidate: &PaymentCandidate) -> bool;
}

/// Policy refusing amounts above a ceiling (in base units).
#[derive(Debug, Clone, Copy)]
pub struct MaxAmount(pub u128);

impl PaymentPolicy for MaxAmount {
    fn allows(&self, candidate: &PaymentCandidate) -> bool {
        candidate
            .amount
            .as_deref()
            .and_then(|amount| amount.parse::<u128>().ok())
            .is_some_and(|amount| amount <= self.0)
    }
}

/// Policy restricting payments to an allowlist of networks.
#[derive(Debug, Clone)]
pub struct NetworkAllowlist(pub Vec<String>);

impl PaymentPolicy for NetworkAllowlist {
    fn allows(&self, candidate: &PaymentCandidate) -> bool {
        self.0.iter().any(|network| network == &candidate.network)
    }
}

/// reqwest middleware that pays 402 responses automatically.
pub struct T402Client<TSelector = FirstMatch> {
    schemes: Vec<Arc<dyn SchemeClient>>,
    selector: TSelector,
    policies: Vec<Arc<dyn PaymentPolicy>>,
}

impl std::fmt::Debug for T402Client<FirstMatch> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("T402Client")
            .field("schemes", &self.schemes.len())
            .field("policies", &self.policies.len())
            .finish_non_exhaustive()
    }
}

impl T402Client<FirstMatch> {
    /// Creates a client with first-match selection and no policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for T402Client<FirstMatch> {
    fn default() -> Self {
        Self {
            schemes: Vec::new(),
            selector: FirstMatch,
            policies: Vec::new(),
        }
    }
}

impl<TSelector> T402Client<TSelector> {
    /// Registers a scheme client.
    #[must_use]
    pub fn register<S: SchemeClient + 'static>(mut self, scheme: S) -> Self {
        self.schemes.push(Arc::new(scheme));
        self
    }

    /// Replaces the payment selector.
    pub fn with_selector<P: PaymentSelector + 'static>(self, selector: P) -> T402Client<P> {
        T402Client {
            schemes: self.schemes,
            selector,
            policies: self.policies,
        }
    }

    /// Adds a payment policy to the filtering pipeline.
    #[must_use]
    pub fn with_policy<P: PaymentPolicy + 'static>(mut self, policy: P) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    fn candidates(&self, payment_required: &proto::PaymentRequired) -> Vec<PaymentCandidate> {
        let mut candidates = Vec::new();
        match payment_required {
            proto::PaymentRequired::V2(required) => {
                for accept in &required.accepts {
                    let network = accept.network.to_string();
                    for client in &self.schemes {
                        if client.supports(2, &accept.scheme, &network) {
                            candidates.push(PaymentCandidate {
                                t402_version: 2,
                                scheme: accept.scheme.clone(),
                                network: network.clone(),
                                amount: Some(accept.amount.clone()),
                                requirements: serde_json::to_value(accept)
                                    .unwrap_or_default(),
                                client: Arc::clone(client),
                            });
                        }
                    }
                }
            }
            proto::PaymentRequired::V1(required) => {
                for accept in &required.accepts {
                    for client in &self.schemes {
                        if client.supports(1, &accept.scheme, &accept.network) {
                            candidates.push(PaymentCandidate {
                                t402_version: 1,
                                scheme: accept.scheme.clone(),
                                network: accept.network.clone(),
                                amount: Some(accept.max_amount_required.clone()),
                                requirements: serde_json::to_value(accept)
                                    .unwrap_or_default(),
                                client: Arc::clone(client),
                            });
                        }
                    }
                }
            }
        }
        candidates
    }
}

impl<TSelector> T402Client<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Builds the payment headers answering a 402 response.
    ///
    /// # Errors
    ///
    /// Returns [`T402ClientError`] when the body cannot be parsed, no
    /// registered client can satisfy an option, or signing fails.
    pub async fn make_payment_headers(
        &self,
        response: Response,
    ) -> Result<HeaderMap, T402ClientError> {
        let payment_required = parse_payment_required(response)
            .await
            .ok_or_else(|| T402ClientError::Parse("unrecognized 402 body".to_owned()))?;

        let resource = match &payment_required {
            proto::PaymentRequired::V2(required) => required.resource.clone(),
            proto::PaymentRequired::V1(_) => None,
        };

        let candidates = self.candidates(&payment_required);
        let filtered: Vec<PaymentCandidate> = candidates
            .into_iter()
            .filter(|candidate| self.policies.iter().all(|policy| policy.allows(candidate)))
            .collect();
        let selected = self
            .selector
            .select(&filtered)
            .ok_or(T402ClientError::NoMatchingPaymentOption)?;

        let payload = selected
            .client
            .create_payment_payload(
                selected.t402_version,
                &selected.requirements,
                resource.as_ref(),
                None,
            )
            .await?;
        let encoded = encode_payment_header(&payload);

        let header_name = match selected.t402_version {
            1 => X_PAYMENT_HEADER,
            _ => PAYMENT_SIGNATURE_HEADER,
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header_name,
            encoded
                .parse()
                .map_err(|_| T402ClientError::InvalidHeaderValue)?,
        );
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl<TSelector> rqm::Middleware for T402Client<TSelector>
where
    TSelector: PaymentSelector + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let headers = self
            .make_payment_headers(response)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let mut retry =
            retry_req.ok_or(rqm::Error::Middleware(T402ClientError::RequestNotCloneable.into()))?;
        retry.headers_mut().extend(headers);
        next.run(retry, extensions).await
    }
}

/// Parses a 402 response body into a version-tagged [`proto::PaymentRequired`].
async fn parse_payment_required(response: Response) -> Option<proto::PaymentRequired> {
    let bytes = response.bytes().await.ok()?;
    if let Ok(required) = serde_json::from_slice::<v2::PaymentRequired>(&bytes) {
        return Some(proto::PaymentRequired::V2(required));
    }
    serde_json::from_slice::<v1::PaymentRequired>(&bytes)
        .ok()
        .map(proto::PaymentRequired::V1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use t402::facilitator::BoxFuture;
    use t402::proto::Extensions as ProtoExtensions;

    struct StubClient;

    impl SchemeClient for StubClient {
        fn supports(&self, t402_version: u8, scheme: &str, network: &str) -> bool {
            t402_version == 2 && scheme == "exact" && network.starts_with("eip155:")
        }

        fn create_payment_payload<'a>(
            &'a self,
            _t402_version: u8,
            requirements: &'a serde_json::Value,
            _resource: Option<&'a v2::ResourceInfo>,
            _extensions: Option<&'a ProtoExtensions>,
        ) -> BoxFuture<'a, Result<Vec<u8>, SchemeClientError>> {
            Box::pin(async move {
                let payload = serde_json::json!({
                    "t402Version": 2,
                    "accepted": requirements,
                    "payload": { "signature": "0xstub" },
                });
                Ok(serde_json::to_vec(&payload).unwrap())
            })
        }
    }

    fn required_v2(amount: &str) -> v2::PaymentRequired {
        v2::PaymentRequired {
            t402_version: v2::V2,
            error: None,
            resource: None,
            accepts: vec![v2::PaymentRequirements {
                scheme: "exact".to_owned(),
                network: "eip155:84532".parse().unwrap(),
                amount: amount.to_owned(),
                pay_to: "0xR".to_owned(),
                max_timeout_seconds: 300,
                asset: "0xA".to_owned(),
                extra: None,
            }],
            extensions: None,
        }
    }

    #[test]
    fn candidates_respect_scheme_support() {
        let client = T402Client::new().register(StubClient);
        let required = proto::PaymentRequired::V2(required_v2("1000"));
        let candidates = client.candidates(&required);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].network, "eip155:84532");
    }

    #[test]
    fn policies_filter_candidates() {
        let client = T402Client::new()
            .register(StubClient)
            .with_policy(MaxAmount(500));
        let required = proto::PaymentRequired::V2(required_v2("1000"));
        let candidates = client.candidates(&required);
        let filtered: Vec<_> = candidates
            .into_iter()
            .filter(|c| client.policies.iter().all(|p| p.allows(c)))
            .collect();
        assert!(filtered.is_empty());

        let allowing = NetworkAllowlist(vec!["eip155:84532".to_owned()]);
        let required = proto::PaymentRequired::V2(required_v2("100"));
        let candidates = client.candidates(&required);
        assert!(candidates.iter().all(|c| allowing.allows(c)));
    }
}
