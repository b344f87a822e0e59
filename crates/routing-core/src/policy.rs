//! The plugin seams: a routing policy selects children for a policy
//! directive and later merges their replies; a protocol is the factory that
//! instantiates named policies; a retry policy decides whether and when a
//! failed send is retried.
//!
//! Defined here, rather than in `runtime-policy`, because
//! [`crate::RoutingContext`] — which every `select`/`merge` call takes by
//! mutable reference — is itself a `routing-core` type built directly on
//! top of the tree arena. Putting the trait in `runtime-policy` and
//! `RoutingContext` in `routing-core` would make the two crates depend on
//! each other. `runtime-policy` depends on `routing-core` and supplies only
//! concrete implementations of these traits.

use std::sync::Arc;

use crate::context::RoutingContext;
use crate::error::ErrorCode;

/// Supplied by protocol plugins; the core only ever holds one by owning
/// handle and calls `select` then, once every child has replied, `merge`.
/// Both calls are wrapped in a panic boundary (the Rust analogue of the C++
/// `catch (const std::exception&)` around a plugin call) that converts a
/// panicking policy into [`ErrorCode::POLICY_ERROR`] rather than taking
/// down the resolving thread.
pub trait RoutingPolicy: Send + Sync {
    /// Adds child routes to `ctx` and/or sets a reply. If neither happens,
    /// the tree synthesizes [`ErrorCode::NO_SERVICES_FOR_ROUTE`].
    fn select(&self, ctx: &mut RoutingContext<'_>);

    /// Reads child replies via [`RoutingContext::child_iter`] and sets a
    /// merged reply. If none is set, the tree synthesizes
    /// [`ErrorCode::APP_FATAL_ERROR`].
    fn merge(&self, ctx: &mut RoutingContext<'_>);
}

/// Per-protocol factory for named routing policies.
pub trait Protocol: Send + Sync {
    /// This protocol's name, matched against [`crate::Message::protocol`].
    fn name(&self) -> &str;

    /// Instantiates the policy named `name` configured with `param`, or
    /// `None` if this protocol has no such policy.
    fn create_policy(&self, name: &str, param: &str) -> Option<Arc<dyn RoutingPolicy>>;
}

/// Decides whether a failed send is retryable, and how long to wait before
/// the next attempt.
pub trait RetryPolicy: Send + Sync {
    /// Whether a reply carrying only this code (and codes like it) should
    /// be retried.
    fn can_retry(&self, code: ErrorCode) -> bool;

    /// The delay, in seconds, before retry attempt number `attempt`
    /// (1-based) should be scheduled.
    fn delay(&self, attempt: u32) -> f64;
}
