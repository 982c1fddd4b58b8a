//! Lifecycle hooks around facilitator verify and settle.
//!
//! Each facilitator instance exposes six hook points, executed sequentially
//! in registration order:
//!
//! 1. **Before hooks** (`on_before_verify`, `on_before_settle`) run ahead of
//!    the operation and may abort it. The first abort wins: the remaining
//!    before hooks are skipped, no handler method runs, and the caller
//!    receives a *structured* failure carrying the abort reason (the chain
//!    is never touched).
//! 2. **After hooks** (`on_after_verify`, `on_after_settle`) observe a
//!    successful outcome. Their errors are logged and ignored.
//! 3. **Failure hooks** (`on_verify_failure`, `on_settle_failure`) run when
//!    the operation errors *or* produces a structured failure. The first
//!    hook returning a recovery result overwrites the outcome; subsequent
//!    failure hooks are skipped.
//!
//! An error returned from a before hook converts the dispatch to a failure
//! and triggers the failure chain.
//!
//! Hooks that keep cross-request state (e.g., "settle only within five
//! minutes of verify") must tolerate concurrent invocation; the pipeline
//! gives no synchronization beyond sequential execution within one request.

use std::future::Future;
use std::sync::Arc;

use crate::facilitator::BoxFuture;
use crate::networks::NetworkRegistry;
use crate::proto;
use crate::proto::{PayloadView, RequirementsView};
use crate::timestamp::UnixTimestamp;

/// Context handed to verify-side hooks.
#[derive(Debug, Clone)]
pub struct VerifyHookContext {
    /// The raw request, exactly as received.
    pub request: proto::VerifyRequest,
    /// Version/scheme/network view over the payload, when it parses.
    pub payload: Option<PayloadView>,
    /// Scheme/network/amount view over the requirements, when they parse.
    pub requirements: Option<RequirementsView>,
    /// The time the dispatch started.
    pub timestamp: UnixTimestamp,
}

impl VerifyHookContext {
    /// Builds the context from a raw request, resolving best-effort views.
    #[must_use]
    pub fn from_request(request: &proto::VerifyRequest, networks: &NetworkRegistry) -> Self {
        Self {
            payload: request.payload_view(networks).ok(),
            requirements: request.requirements_view().ok(),
            request: request.clone(),
            timestamp: UnixTimestamp::now(),
        }
    }
}

/// Context handed to settle-side hooks.
///
/// Structurally identical to [`VerifyHookContext`]; kept distinct so hooks
/// cannot be accidentally cross-registered.
#[derive(Debug, Clone)]
pub struct SettleHookContext {
    /// The raw request, exactly as received.
    pub request: proto::SettleRequest,
    /// Version/scheme/network view over the payload, when it parses.
    pub payload: Option<PayloadView>,
    /// Scheme/network/amount view over the requirements, when they parse.
    pub requirements: Option<RequirementsView>,
    /// The time the dispatch started.
    pub timestamp: UnixTimestamp,
}

impl SettleHookContext {
    /// Builds the context from a raw request, resolving best-effort views.
    #[must_use]
    pub fn from_request(request: &proto::SettleRequest, networks: &NetworkRegistry) -> Self {
        Self {
            payload: request.payload_view(networks).ok(),
            requirements: request.requirements_view().ok(),
            request: request.clone(),
            timestamp: UnixTimestamp::now(),
        }
    }
}

/// Context handed to verify failure hooks.
#[derive(Debug, Clone)]
pub struct VerifyFailureContext {
    /// The original verify context.
    pub ctx: VerifyHookContext,
    /// Description of the failure (a registered reason or error text).
    pub error: String,
}

/// Context handed to settle failure hooks.
#[derive(Debug, Clone)]
pub struct SettleFailureContext {
    /// The original settle context.
    pub ctx: SettleHookContext,
    /// Description of the failure (a registered reason or error text).
    pub error: String,
}

/// Returned by a before hook to abort the operation.
#[derive(Debug, Clone)]
pub struct HookAbort {
    /// The reason surfaced to the caller as `invalidReason` / `errorReason`.
    pub reason: String,
}

impl HookAbort {
    /// Creates a new abort result.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Returned by a verify failure hook to overwrite the outcome.
#[derive(Debug, Clone)]
pub struct RecoveredVerify {
    /// The replacement verification result.
    pub response: proto::VerifyResponse,
}

/// Returned by a settle failure hook to overwrite the outcome.
#[derive(Debug, Clone)]
pub struct RecoveredSettle {
    /// The replacement settlement result.
    pub response: proto::SettleResponse,
}

/// Hook called before payment verification.
pub type BeforeVerifyHook =
    Arc<dyn Fn(VerifyHookContext) -> BoxFuture<'static, Result<Option<HookAbort>, String>> + Send + Sync>;

/// Hook called after successful payment verification.
pub type AfterVerifyHook =
    Arc<dyn Fn(VerifyHookContext, proto::VerifyResponse) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Hook called when payment verification fails.
pub type OnVerifyFailureHook = Arc<
    dyn Fn(VerifyFailureContext) -> BoxFuture<'static, Result<Option<RecoveredVerify>, String>>
        + Send
        + Sync,
>;

/// Hook called before payment settlement.
pub type BeforeSettleHook =
    Arc<dyn Fn(SettleHookContext) -> BoxFuture<'static, Result<Option<HookAbort>, String>> + Send + Sync>;

/// Hook called after successful payment settlement.
pub type AfterSettleHook =
    Arc<dyn Fn(SettleHookContext, proto::SettleResponse) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Hook called when payment settlement fails.
pub type OnSettleFailureHook = Arc<
    dyn Fn(SettleFailureContext) -> BoxFuture<'static, Result<Option<RecoveredSettle>, String>>
        + Send
        + Sync,
>;

/// The six hook lists of a facilitator instance.
///
/// All hooks are optional; lists are fixed at startup (runtime registration
/// from request-handling tasks is out of scope).
#[derive(Clone, Default)]
pub struct FacilitatorHooks {
    pub(crate) before_verify: Vec<BeforeVerifyHook>,
    pub(crate) after_verify: Vec<AfterVerifyHook>,
    pub(crate) on_verify_failure: Vec<OnVerifyFailureHook>,
    pub(crate) before_settle: Vec<BeforeSettleHook>,
    pub(crate) after_settle: Vec<AfterSettleHook>,
    pub(crate) on_settle_failure: Vec<OnSettleFailureHook>,
}

impl std::fmt::Debug for FacilitatorHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorHooks")
            .field("before_verify", &self.before_verify.len())
            .field("after_verify", &self.after_verify.len())
            .field("on_verify_failure", &self.on_verify_failure.len())
            .field("before_settle", &self.before_settle.len())
            .field("after_settle", &self.after_settle.len())
            .field("on_settle_failure", &self.on_settle_failure.len())
            .finish()
    }
}

impl FacilitatorHooks {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before_verify.is_empty()
            && self.after_verify.is_empty()
            && self.on_verify_failure.is_empty()
            && self.before_settle.is_empty()
            && self.after_settle.is_empty()
            && self.on_settle_failure.is_empty()
    }

    /// Registers a hook to execute before payment verification.
    #[must_use]
    pub fn on_before_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyHookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HookAbort>, String>> + Send + 'static,
    {
        self.before_verify
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute after successful payment verification.
    #[must_use]
    pub fn on_after_verify<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyHookContext, proto::VerifyResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_verify
            .push(Arc::new(move |ctx, response| Box::pin(hook(ctx, response))));
        self
    }

    /// Registers a hook to execute when payment verification fails.
    #[must_use]
    pub fn on_verify_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(VerifyFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<RecoveredVerify>, String>> + Send + 'static,
    {
        self.on_verify_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute before payment settlement.
    #[must_use]
    pub fn on_before_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleHookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HookAbort>, String>> + Send + 'static,
    {
        self.before_settle
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers a hook to execute after successful payment settlement.
    #[must_use]
    pub fn on_after_settle<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleHookContext, proto::SettleResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.after_settle
            .push(Arc::new(move |ctx, response| Box::pin(hook(ctx, response))));
        self
    }

    /// Registers a hook to execute when payment settlement fails.
    #[must_use]
    pub fn on_settle_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SettleFailureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<RecoveredSettle>, String>> + Send + 'static,
    {
        self.on_settle_failure
            .push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }
}
