//! The minimal data a [`crate::RoutingTree`] and [`crate::Resender`] need
//! from the message/reply pair they carry. Not a message bus façade: no
//! sessions, no wire codec, no protocol payload — just the fields the
//! resolver and resender read or write.

use std::time::{Duration, Instant};

use governance_traceability::{Trace, TraceLevel};
use routing_model::Route;
use uuid::Uuid;

use crate::error::Error;

/// The outbound half of a send: the protocol it belongs to (selects which
/// [`routing_table::RoutingTable`] applies), the route being resolved, and
/// the retry bookkeeping the resender reads and writes.
#[derive(Debug, Clone)]
pub struct Message {
    protocol: String,
    route: Route,
    retry: u32,
    retry_enabled: bool,
    deadline: Option<Instant>,
    trace_id: Uuid,
}

impl Message {
    /// Builds a message with a fresh, random `trace_id`, used to correlate
    /// every log line a single resolution (and any of its retries) emits.
    #[must_use]
    pub fn new(protocol: impl Into<String>, route: Route) -> Self {
        Self {
            protocol: protocol.into(),
            route,
            retry: 0,
            retry_enabled: false,
            deadline: None,
            trace_id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Correlates every `tracing` event this message's resolution (and any
    /// retry of it) emits, the same random id across every attempt.
    #[must_use]
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn set_route(&mut self, route: Route) -> &mut Self {
        self.route = route;
        self
    }

    #[must_use]
    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn set_retry(&mut self, retry: u32) -> &mut Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn retry_enabled(&self) -> bool {
        self.retry_enabled
    }

    pub fn set_retry_enabled(mut self, retry_enabled: bool) -> Self {
        self.retry_enabled = retry_enabled;
        self
    }

    /// Sets a deadline `ttl` from now; `time_remaining_now` reports against
    /// it on every call, not a value fixed at construction time.
    #[must_use]
    pub fn set_time_to_live(mut self, ttl: Duration) -> Self {
        self.deadline = Some(Instant::now() + ttl);
        self
    }

    /// The time remaining until this message's deadline, recomputed against
    /// the current instant. `Duration::MAX` when no deadline was set.
    #[must_use]
    pub fn time_remaining_now(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}

/// The reply a resolution tree eventually hands back to the caller: zero or
/// more errors, an optional override for the next retry delay, and the
/// trace accumulated while resolving.
#[derive(Debug, Clone)]
pub struct Reply {
    errors: Vec<Error>,
    retry_delay: f64,
    trace: Trace,
}

impl Reply {
    /// An empty reply tracing at `level`.
    #[must_use]
    pub fn new(level: TraceLevel) -> Self {
        Self { errors: Vec::new(), retry_delay: -1.0, trace: Trace::new(level) }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn num_errors(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Appends `error`, keeping any already present.
    pub fn add_error(&mut self, error: Error) -> &mut Self {
        self.errors.push(error);
        self
    }

    /// Replaces all errors with just `error`.
    pub fn set_error(&mut self, error: Error) -> &mut Self {
        self.errors.clear();
        self.errors.push(error);
        self
    }

    /// Discards all errors, leaving an otherwise-unchanged reply.
    pub fn clear_errors(&mut self) -> &mut Self {
        self.errors.clear();
        self
    }

    /// A negative value (the default) means "no override"; the retry
    /// policy's own backoff computation applies.
    #[must_use]
    pub fn retry_delay(&self) -> f64 {
        self.retry_delay
    }

    pub fn set_retry_delay(&mut self, seconds: f64) -> &mut Self {
        self.retry_delay = seconds;
        self
    }

    #[must_use]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut Trace {
        &mut self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn set_error_replaces_add_error_appends() {
        let mut reply = Reply::new(TraceLevel::NONE);
        reply.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "first"));
        reply.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "second"));
        assert_eq!(reply.num_errors(), 2);
        reply.set_error(Error::new(ErrorCode::ILLEGAL_ROUTE, "replaced"));
        assert_eq!(reply.num_errors(), 1);
        assert_eq!(reply.errors()[0].code(), ErrorCode::ILLEGAL_ROUTE);
    }

    #[test]
    fn time_remaining_without_deadline_is_effectively_unbounded() {
        let msg = Message::new("test", Route::parse("a"));
        assert_eq!(msg.time_remaining_now(), Duration::MAX);
    }

    #[test]
    fn time_remaining_counts_down_toward_deadline() {
        let msg = Message::new("test", Route::parse("a")).set_time_to_live(Duration::from_secs(5));
        let remaining = msg.time_remaining_now();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_millis(0));
    }
}
