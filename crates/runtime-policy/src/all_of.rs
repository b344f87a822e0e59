//! A fan-out policy that sends to every matched recipient unconditionally
//! and merges by folding every child's errors together, rather than
//! preferring the first error-free reply.

use routing_core::{ErrorCode, Reply, RoutingContext, RoutingPolicy};

/// Adds every matched recipient as a child, with no rotation; on `merge`,
/// starts from the first child's reply and appends every other child's
/// errors onto it, so a single failing branch's error never gets dropped
/// just because a sibling happened to succeed.
#[derive(Default)]
pub struct AllOfPolicy;

impl AllOfPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RoutingPolicy for AllOfPolicy {
    fn select(&self, ctx: &mut RoutingContext<'_>) {
        let recipients = ctx.recipients().to_vec();
        if recipients.is_empty() {
            ctx.set_error(ErrorCode::NO_SERVICES_FOR_ROUTE, "No recipients configured for route.");
            return;
        }
        for recipient in recipients {
            ctx.add_child(recipient);
        }
    }

    fn merge(&self, ctx: &mut RoutingContext<'_>) {
        let replies: Vec<Reply> = ctx.child_iter().filter_map(|child| child.reply().cloned()).collect();
        let Some((first, rest)) = replies.split_first() else {
            ctx.set_error(ErrorCode::NO_SERVICES_FOR_ROUTE, "No child replies to merge.");
            return;
        };
        let mut merged = first.clone();
        for reply in rest {
            for error in reply.errors() {
                merged.add_error(error.clone());
            }
        }
        ctx.set_reply(merged);
    }
}
