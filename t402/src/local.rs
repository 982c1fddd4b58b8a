//! Registry-backed facilitator dispatch.
//!
//! [`FacilitatorLocal`] is the facilitator core: it resolves the protocol
//! version and (scheme, network) pair from the raw payload bytes, routes the
//! request through the hook pipeline to the matching mechanism handler, and
//! normalizes failures into the structured wire responses.
//!
//! # Dispatch flow
//!
//! 1. Run the before-hook chain (first abort wins and short-circuits into a
//!    structured failure; the handler is never invoked).
//! 2. Resolve the payload view; a declared/payload version disagreement is a
//!    `protocol_version_mismatch` failure.
//! 3. Look up the handler: exact `(version, scheme, network)` first, then
//!    the `namespace:*` family wildcard.
//! 4. Invoke the handler.
//! 5. Run after hooks on success, or the failure chain on error/structured
//!    failure (first recovery wins).
//!
//! Structured failures ([`VerificationError`], [`SettlementError`]) are
//! converted into `isValid:false` / `success:false` responses here so the
//! HTTP surface can return them with status 200. Unexpected errors
//! propagate as [`FacilitatorError`] and become 5xx.

use crate::chain::ChainId;
use crate::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use crate::hooks::{
    FacilitatorHooks, SettleFailureContext, SettleHookContext, VerifyFailureContext,
    VerifyHookContext,
};
use crate::networks::NetworkRegistry;
use crate::proto;
use crate::proto::VerificationError;
use crate::scheme::{HandlerKey, SchemeRegistry};

use std::collections::HashMap;

/// A facilitator that dispatches to registered mechanism handlers through
/// the lifecycle hook pipeline.
pub struct FacilitatorLocal {
    registry: SchemeRegistry,
    networks: NetworkRegistry,
    hooks: FacilitatorHooks,
}

impl std::fmt::Debug for FacilitatorLocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorLocal")
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl FacilitatorLocal {
    /// Creates a facilitator over the given handler registry.
    ///
    /// The [`NetworkRegistry`] resolves V1 legacy network names during
    /// payload routing.
    #[must_use]
    pub fn new(registry: SchemeRegistry, networks: NetworkRegistry) -> Self {
        Self {
            registry,
            networks,
            hooks: FacilitatorHooks::default(),
        }
    }

    /// Attaches lifecycle hooks to this facilitator.
    #[must_use]
    pub fn with_hooks(mut self, hooks: FacilitatorHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the network registry used for V1 name resolution.
    #[must_use]
    pub const fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    fn resolve_handler(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<&dyn Facilitator, VerificationError> {
        let view = request.payload_view(&self.networks)?;
        if view.t402_version != request.t402_version {
            return Err(VerificationError::VersionMismatch);
        }
        let chain_id: ChainId = view
            .chain_id
            .clone()
            .ok_or(VerificationError::UnsupportedNetwork)?;
        let key = HandlerKey::new(view.t402_version, view.scheme.clone(), chain_id);
        self.registry
            .by_key(&key)
            .map(|handler| &**handler)
            .ok_or(VerificationError::NoHandler {
                scheme: view.scheme,
                network: view.network,
            })
    }

    async fn dispatch_verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<proto::VerifyResponse, FacilitatorError> {
        let handler = self.resolve_handler(request)?;
        handler.verify(request.clone()).await
    }

    async fn dispatch_settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<proto::SettleResponse, FacilitatorError> {
        let handler = self.resolve_handler(request)?;
        handler.settle(request.clone()).await
    }

    async fn run_verify_failure_hooks(
        &self,
        ctx: &VerifyHookContext,
        error: String,
    ) -> Option<proto::VerifyResponse> {
        let failure_ctx = VerifyFailureContext {
            ctx: ctx.clone(),
            error,
        };
        for hook in &self.hooks.on_verify_failure {
            if let Ok(Some(recovered)) = hook(failure_ctx.clone()).await {
                return Some(recovered.response);
            }
        }
        None
    }

    async fn run_settle_failure_hooks(
        &self,
        ctx: &SettleHookContext,
        error: String,
    ) -> Option<proto::SettleResponse> {
        let failure_ctx = SettleFailureContext {
            ctx: ctx.clone(),
            error,
        };
        for hook in &self.hooks.on_settle_failure {
            if let Ok(Some(recovered)) = hook(failure_ctx.clone()).await {
                return Some(recovered.response);
            }
        }
        None
    }

    async fn finish_verify(
        &self,
        ctx: VerifyHookContext,
        outcome: Result<proto::VerifyResponse, FacilitatorError>,
    ) -> Result<proto::VerifyResponse, FacilitatorError> {
        match outcome {
            Ok(response) if response.is_valid() => {
                for hook in &self.hooks.after_verify {
                    if let Err(_err) = hook(ctx.clone(), response.clone()).await {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(error = %_err, "after-verify hook failed");
                    }
                }
                Ok(response)
            }
            Ok(response) => {
                let error = response.invalid_reason().unwrap_or_default().to_owned();
                if let Some(recovered) = self.run_verify_failure_hooks(&ctx, error).await {
                    return Ok(recovered);
                }
                Ok(response)
            }
            Err(error) => {
                if let Some(recovered) =
                    self.run_verify_failure_hooks(&ctx, error.to_string()).await
                {
                    return Ok(recovered);
                }
                match error {
                    FacilitatorError::Verification(e) => Ok(proto::VerifyResponse::invalid(
                        None,
                        e.reason().as_str().to_owned(),
                    )),
                    FacilitatorError::Settlement(e) => Ok(proto::VerifyResponse::invalid(
                        None,
                        e.reason().as_str().to_owned(),
                    )),
                    unexpected => Err(unexpected),
                }
            }
        }
    }

    async fn finish_settle(
        &self,
        ctx: SettleHookContext,
        outcome: Result<proto::SettleResponse, FacilitatorError>,
    ) -> Result<proto::SettleResponse, FacilitatorError> {
        let network = ctx
            .payload
            .as_ref()
            .map(|view| view.network.clone())
            .unwrap_or_default();
        match outcome {
            Ok(response) if response.is_success() => {
                for hook in &self.hooks.after_settle {
                    if let Err(_err) = hook(ctx.clone(), response.clone()).await {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(error = %_err, "after-settle hook failed");
                    }
                }
                Ok(response)
            }
            Ok(response) => {
                let error = response.error_reason().unwrap_or_default().to_owned();
                if let Some(recovered) = self.run_settle_failure_hooks(&ctx, error).await {
                    return Ok(recovered);
                }
                Ok(response)
            }
            Err(error) => {
                if let Some(recovered) =
                    self.run_settle_failure_hooks(&ctx, error.to_string()).await
                {
                    return Ok(recovered);
                }
                let reason = match error {
                    FacilitatorError::Verification(e) => e.reason(),
                    FacilitatorError::Settlement(e) => e.reason(),
                    unexpected => return Err(unexpected),
                };
                Ok(proto::SettleResponse::Error {
                    reason: reason.as_str().to_owned(),
                    network,
                    payer: None,
                })
            }
        }
    }
}

impl Facilitator for FacilitatorLocal {
    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "t402.verify", skip_all))]
    fn verify(
        &self,
        request: proto::VerifyRequest,
    ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            let ctx = VerifyHookContext::from_request(&request, &self.networks);
            for hook in &self.hooks.before_verify {
                match hook(ctx.clone()).await {
                    Ok(Some(abort)) => {
                        return Ok(proto::VerifyResponse::invalid(None, abort.reason));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        let outcome = Err(FacilitatorError::Other(error.into()));
                        return self.finish_verify(ctx, outcome).await;
                    }
                }
            }
            let outcome = self.dispatch_verify(&request).await;
            self.finish_verify(ctx, outcome).await
        })
    }

    #[cfg_attr(feature = "telemetry", tracing::instrument(name = "t402.settle", skip_all))]
    fn settle(
        &self,
        request: proto::SettleRequest,
    ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let ctx = SettleHookContext::from_request(&request, &self.networks);
            for hook in &self.hooks.before_settle {
                match hook(ctx.clone()).await {
                    Ok(Some(abort)) => {
                        // Hook abort: structured failure, the chain is never
                        // touched. Network comes from the payload view when
                        // the payload parses.
                        let network = ctx
                            .payload
                            .as_ref()
                            .map(|view| view.network.clone())
                            .unwrap_or_default();
                        return Ok(proto::SettleResponse::Error {
                            reason: abort.reason,
                            network,
                            payer: None,
                        });
                    }
                    Ok(None) => {}
                    Err(error) => {
                        let outcome = Err(FacilitatorError::Other(error.into()));
                        return self.finish_settle(ctx, outcome).await;
                    }
                }
            }
            let outcome = self.dispatch_settle(&request).await;
            self.finish_settle(ctx, outcome).await
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let mut kinds: Vec<proto::SupportedPaymentKind> = Vec::new();
            let mut extensions: Vec<String> = Vec::new();
            let mut signers: HashMap<String, Vec<String>> = HashMap::new();
            for handler in self.registry.handlers() {
                let Ok(supported) = handler.supported().await else {
                    continue;
                };
                for kind in supported.kinds {
                    let duplicate = kinds.iter().any(|k| {
                        k.t402_version == kind.t402_version
                            && k.scheme == kind.scheme
                            && k.network == kind.network
                    });
                    if !duplicate {
                        kinds.push(kind);
                    }
                }
                for extension in supported.extensions {
                    if !extensions.contains(&extension) {
                        extensions.push(extension);
                    }
                }
                for (network, addresses) in supported.signers {
                    signers.entry(network).or_insert(addresses);
                }
            }
            Ok(proto::SupportedResponse {
                kinds,
                extensions,
                signers,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookAbort, RecoveredSettle, RecoveredVerify};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An in-memory "cash" mechanism used to exercise the dispatch pipeline
    /// without any chain. Scheme "cash" on network "t402:cash".
    struct CashHandler {
        verify_calls: Arc<AtomicUsize>,
        settle_calls: Arc<AtomicUsize>,
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct CashPayload {
        payer: String,
    }

    type CashRequest =
        proto::v2::TypedRequest<proto::v2::PaymentPayload<proto::v2::PaymentRequirements, CashPayload>, proto::v2::PaymentRequirements>;

    impl CashHandler {
        fn new() -> Self {
            Self {
                verify_calls: Arc::new(AtomicUsize::new(0)),
                settle_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn check(request: &proto::VerifyRequest) -> Result<(String, proto::v2::PaymentRequirements), FacilitatorError> {
            let typed = CashRequest::from_request(request)?;
            let payload = typed.payment_payload;
            let requirements = typed.payment_requirements;
            if !payload.accepted.matches(&requirements) {
                return Err(VerificationError::NoMatchingRequirement.into());
            }
            if requirements.amount.parse::<u64>().unwrap_or(0) > 1_000_000 {
                return Err(VerificationError::InsufficientFunds.into());
            }
            Ok((payload.payload.payer, requirements))
        }
    }

    impl Facilitator for CashHandler {
        fn verify(
            &self,
            request: proto::VerifyRequest,
        ) -> BoxFuture<'_, Result<proto::VerifyResponse, FacilitatorError>> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let (payer, _) = Self::check(&request)?;
                Ok(proto::VerifyResponse::valid(payer))
            })
        }

        fn settle(
            &self,
            request: proto::SettleRequest,
        ) -> BoxFuture<'_, Result<proto::SettleResponse, FacilitatorError>> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let (payer, requirements) = Self::check(&request)?;
                let transaction = format!(
                    "{} transferred {} {} to {}",
                    payer, requirements.amount, requirements.asset, requirements.pay_to
                );
                Ok(proto::SettleResponse::Success {
                    payer,
                    transaction,
                    network: requirements.network.to_string(),
                })
            })
        }

        fn supported(
            &self,
        ) -> BoxFuture<'_, Result<proto::SupportedResponse, FacilitatorError>> {
            Box::pin(async {
                Ok(proto::SupportedResponse {
                    kinds: vec![proto::SupportedPaymentKind {
                        t402_version: 2,
                        scheme: "cash".to_owned(),
                        network: "t402:cash".to_owned(),
                        asset: Some("USD".to_owned()),
                        extra: None,
                        extensions: None,
                    }],
                    extensions: vec!["receipts".to_owned()],
                    signers: HashMap::from([(
                        "t402:cash".to_owned(),
                        vec!["Company Co.".to_owned()],
                    )]),
                })
            })
        }
    }

    fn cash_requirements() -> proto::v2::PaymentRequirements {
        proto::v2::PaymentRequirements {
            scheme: "cash".to_owned(),
            network: "t402:cash".parse().unwrap(),
            amount: "1".to_owned(),
            pay_to: "Company Co.".to_owned(),
            max_timeout_seconds: 60,
            asset: "USD".to_owned(),
            extra: None,
        }
    }

    fn cash_request(payer: &str) -> proto::VerifyRequest {
        let requirements = cash_requirements();
        let payload = proto::v2::PaymentPayload {
            accepted: requirements.clone(),
            payload: CashPayload {
                payer: payer.to_owned(),
            },
            resource: None,
            t402_version: proto::v2::V2,
            extensions: None,
        };
        proto::VerifyRequest::assemble(2, &payload, &requirements).unwrap()
    }

    fn facilitator_with(handler: CashHandler, hooks: FacilitatorHooks) -> FacilitatorLocal {
        let mut registry = SchemeRegistry::new();
        registry.register(
            2,
            "cash",
            &[ChainId::new("t402", "cash")],
            Arc::new(handler),
        );
        FacilitatorLocal::new(registry, NetworkRegistry::new()).with_hooks(hooks)
    }

    #[tokio::test]
    async fn cash_happy_path() {
        let facilitator = facilitator_with(CashHandler::new(), FacilitatorHooks::new());

        let verified = facilitator.verify(cash_request("John")).await.unwrap();
        assert_eq!(verified, proto::VerifyResponse::valid("John".to_owned()));

        let settled = facilitator.settle(cash_request("John")).await.unwrap();
        match settled {
            proto::SettleResponse::Success {
                payer,
                transaction,
                network,
            } => {
                assert_eq!(payer, "John");
                assert_eq!(transaction, "John transferred 1 USD to Company Co.");
                assert_eq!(network, "t402:cash");
            }
            proto::SettleResponse::Error { .. } => panic!("settlement failed"),
        }
    }

    #[tokio::test]
    async fn version_mismatch_is_structured() {
        let facilitator = facilitator_with(CashHandler::new(), FacilitatorHooks::new());
        let mut request = cash_request("John");
        request.t402_version = 1;
        let response = facilitator.verify(request).await.unwrap();
        assert_eq!(
            response.invalid_reason(),
            Some("protocol_version_mismatch")
        );
    }

    #[tokio::test]
    async fn missing_handler_is_structured() {
        let facilitator =
            FacilitatorLocal::new(SchemeRegistry::new(), NetworkRegistry::new());
        let response = facilitator.verify(cash_request("John")).await.unwrap();
        assert_eq!(
            response.invalid_reason(),
            Some("no_handler_for_(scheme,network)")
        );
    }

    #[tokio::test]
    async fn before_verify_abort_short_circuits() {
        let first_abort = Arc::new(AtomicUsize::new(0));
        let second_ran = Arc::new(AtomicUsize::new(0));
        let handler = CashHandler::new();
        let verify_calls = Arc::clone(&handler.verify_calls);

        let first = Arc::clone(&first_abort);
        let second = Arc::clone(&second_ran);
        let hooks = FacilitatorHooks::new()
            .on_before_verify(move |_ctx| {
                let first = Arc::clone(&first);
                async move {
                    first.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(HookAbort::new("payment_blocked")))
                }
            })
            .on_before_verify(move |_ctx| {
                let second = Arc::clone(&second);
                async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            });

        let facilitator = facilitator_with(handler, hooks);
        let response = facilitator.verify(cash_request("John")).await.unwrap();

        assert_eq!(response.invalid_reason(), Some("payment_blocked"));
        assert_eq!(first_abort.load(Ordering::SeqCst), 1);
        // First abort wins: the second before hook never runs and the
        // handler is never invoked.
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
        assert_eq!(verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn before_settle_abort_returns_structured_error() {
        let handler = CashHandler::new();
        let settle_calls = Arc::clone(&handler.settle_calls);
        let hooks = FacilitatorHooks::new().on_before_settle(|_ctx| async move {
            Ok(Some(HookAbort::new("Payment verification expired")))
        });
        let facilitator = facilitator_with(handler, hooks);

        let response = facilitator.settle(cash_request("John")).await.unwrap();
        match response {
            proto::SettleResponse::Error { reason, network, .. } => {
                assert_eq!(reason, "Payment verification expired");
                assert_eq!(network, "t402:cash");
            }
            proto::SettleResponse::Success { .. } => panic!("settle should abort"),
        }
        assert_eq!(settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settle_refused_when_verification_went_stale() {
        // User-owned hook state: fingerprints of verified payloads with
        // the time they were verified. Must tolerate concurrent calls.
        type Fingerprints = Arc<std::sync::Mutex<std::collections::HashMap<String, u64>>>;
        let fingerprints: Fingerprints = Arc::default();
        const MAX_AGE_SECS: u64 = 300;

        let on_verify = Arc::clone(&fingerprints);
        let on_settle = Arc::clone(&fingerprints);
        let hooks = FacilitatorHooks::new()
            .on_after_verify(move |ctx, _response| {
                let fingerprints = Arc::clone(&on_verify);
                async move {
                    let key = ctx.request.payment_payload.get().to_owned();
                    fingerprints
                        .lock()
                        .map_err(|e| e.to_string())?
                        .insert(key, ctx.timestamp.as_secs());
                    Ok(())
                }
            })
            .on_before_settle(move |ctx| {
                let fingerprints = Arc::clone(&on_settle);
                async move {
                    let key = ctx.request.payment_payload.get().to_owned();
                    let verified_at = fingerprints
                        .lock()
                        .map_err(|e| e.to_string())?
                        .get(&key)
                        .copied();
                    let stale = match verified_at {
                        None => true,
                        Some(at) => ctx.timestamp.as_secs().saturating_sub(at) > MAX_AGE_SECS,
                    };
                    Ok(stale.then(|| HookAbort::new("Payment verification expired")))
                }
            });

        let handler = CashHandler::new();
        let settle_calls = Arc::clone(&handler.settle_calls);
        let facilitator = facilitator_with(handler, hooks);

        // Fresh verify → settle succeeds.
        let verified = facilitator.verify(cash_request("John")).await.unwrap();
        assert!(verified.is_valid());
        let settled = facilitator.settle(cash_request("John")).await.unwrap();
        assert!(settled.is_success());
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);

        // Backdate the fingerprint six minutes: the next settle aborts
        // before the handler runs.
        {
            let mut fingerprints = fingerprints.lock().unwrap();
            for verified_at in fingerprints.values_mut() {
                *verified_at -= 6 * 60;
            }
        }
        let refused = facilitator.settle(cash_request("John")).await.unwrap();
        assert_eq!(
            refused.error_reason(),
            Some("Payment verification expired")
        );
        assert_eq!(settle_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failure_hook_recovery_wins() {
        let second_ran = Arc::new(AtomicUsize::new(0));
        let second = Arc::clone(&second_ran);
        let hooks = FacilitatorHooks::new()
            .on_verify_failure(|_ctx| async move {
                Ok(Some(RecoveredVerify {
                    response: proto::VerifyResponse::valid("recovered".to_owned()),
                }))
            })
            .on_verify_failure(move |_ctx| {
                let second = Arc::clone(&second);
                async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            });

        // Empty registry: dispatch fails with no_handler, failure chain runs.
        let facilitator = FacilitatorLocal::new(SchemeRegistry::new(), NetworkRegistry::new())
            .with_hooks(hooks);
        let response = facilitator.verify(cash_request("John")).await.unwrap();
        assert_eq!(response, proto::VerifyResponse::valid("recovered".to_owned()));
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settle_failure_hook_can_recover() {
        let hooks = FacilitatorHooks::new().on_settle_failure(|ctx| async move {
            assert!(!ctx.error.is_empty());
            Ok(Some(RecoveredSettle {
                response: proto::SettleResponse::Success {
                    payer: "recovered".to_owned(),
                    transaction: "offline-receipt".to_owned(),
                    network: "t402:cash".to_owned(),
                },
            }))
        });
        let facilitator = FacilitatorLocal::new(SchemeRegistry::new(), NetworkRegistry::new())
            .with_hooks(hooks);
        let response = facilitator.settle(cash_request("John")).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn before_hook_error_diverts_to_failure_chain() {
        let handler = CashHandler::new();
        let verify_calls = Arc::clone(&handler.verify_calls);
        let hooks = FacilitatorHooks::new()
            .on_before_verify(|_ctx| async move { Err("hook exploded".to_owned()) })
            .on_verify_failure(|ctx| async move {
                assert!(ctx.error.contains("hook exploded"));
                Ok(Some(RecoveredVerify {
                    response: proto::VerifyResponse::invalid(None, "recovered_failure".to_owned()),
                }))
            });
        let facilitator = facilitator_with(handler, hooks);
        let response = facilitator.verify(cash_request("John")).await.unwrap();
        assert_eq!(response.invalid_reason(), Some("recovered_failure"));
        assert_eq!(verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn supported_union_has_no_duplicates() {
        let mut registry = SchemeRegistry::new();
        registry.register(
            2,
            "cash",
            &[ChainId::new("t402", "cash")],
            Arc::new(CashHandler::new()),
        );
        registry.register(
            2,
            "cash",
            &[ChainId::new("t402", "cash")],
            Arc::new(CashHandler::new()),
        );
        let facilitator = FacilitatorLocal::new(registry, NetworkRegistry::new());
        let supported = facilitator.supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.extensions, vec!["receipts".to_owned()]);
        assert_eq!(
            supported.signers.get("t402:cash"),
            Some(&vec!["Company Co.".to_owned()])
        );
    }
}
