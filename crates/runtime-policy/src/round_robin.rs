//! A fan-out policy that spreads load across its matched recipients by
//! rotating the starting point of each `select`, then merges on the first
//! child reply (in that rotated order) carrying no errors.

use std::sync::atomic::{AtomicUsize, Ordering};

use routing_core::{ErrorCode, Reply, RoutingContext, RoutingPolicy};

/// Adds every matched recipient as a child on each `select`, rotating which
/// one comes first so repeated selections spread across all of them; on
/// `merge`, picks the first child reply without errors, or aggregates every
/// child's errors if none succeeded.
#[derive(Default)]
pub struct RoundRobinPolicy {
    next: AtomicUsize,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingPolicy for RoundRobinPolicy {
    fn select(&self, ctx: &mut RoutingContext<'_>) {
        let recipients = ctx.recipients().to_vec();
        if recipients.is_empty() {
            ctx.set_error(ErrorCode::NO_SERVICES_FOR_ROUTE, "No recipients configured for route.");
            return;
        }
        let offset = self.next.fetch_add(1, Ordering::Relaxed) % recipients.len();
        for i in 0..recipients.len() {
            let idx = (offset + i) % recipients.len();
            ctx.add_child(recipients[idx].clone());
        }
    }

    fn merge(&self, ctx: &mut RoutingContext<'_>) {
        let replies: Vec<Reply> = ctx.child_iter().filter_map(|child| child.reply().cloned()).collect();
        for reply in &replies {
            if !reply.has_errors() {
                ctx.set_reply(reply.clone());
                return;
            }
        }
        match replies.split_first() {
            Some((first, rest)) => {
                let mut merged = first.clone();
                for reply in rest {
                    for error in reply.errors() {
                        merged.add_error(error.clone());
                    }
                }
                ctx.set_reply(merged);
            }
            None => ctx.set_error(ErrorCode::NO_SERVICES_FOR_ROUTE, "No child replies to merge."),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use governance_traceability::TraceLevel;
    use routing_core::{Error, LocalNetwork, Message, Protocol, Reply, RoutingTree};
    use routing_model::Route;
    use routing_table::{HopSpec, RoutingTable, RoutingTableSpec};

    use super::*;

    struct TestProtocol(Arc<RoundRobinPolicy>);

    impl Protocol for TestProtocol {
        fn name(&self) -> &str {
            "test"
        }
        fn create_policy(&self, name: &str, _param: &str) -> Option<Arc<dyn RoutingPolicy>> {
            match name {
                "RoundRobin" => Some(self.0.clone() as Arc<dyn RoutingPolicy>),
                _ => None,
            }
        }
    }

    fn lb_table() -> Arc<RoutingTable> {
        let spec = RoutingTableSpec::new("test")
            .add_hop(HopSpec::new("lb", "[RoundRobin]").add_recipient("s/0").add_recipient("s/1"));
        Arc::new(RoutingTable::new(&spec))
    }

    fn send(protocol: Arc<TestProtocol>, network: Arc<LocalNetwork>, table: Arc<RoutingTable>) -> Reply {
        let message = Message::new("test", Route::parse("lb"));
        let (tx, rx) = mpsc::channel();
        let tree = RoutingTree::new(
            message,
            Some(table),
            protocol,
            network,
            None,
            TraceLevel::NONE,
            move |reply| {
                let _ = tx.send(reply);
            },
            || {},
        );
        RoutingTree::send(&tree);
        rx.recv_timeout(Duration::from_secs(1)).expect("reply delivered")
    }

    #[test]
    fn fans_out_to_every_recipient_and_merges_on_first_success() {
        let network = Arc::new(LocalNetwork::new());
        network.script_reply("s/0", {
            let mut r = Reply::new(TraceLevel::NONE);
            r.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "down"));
            r
        });
        let protocol = Arc::new(TestProtocol(Arc::new(RoundRobinPolicy::new())));
        let reply = send(protocol, network.clone(), lb_table());
        assert!(!reply.has_errors());
        // collect_leaves_with_address walks the tree via an explicit stack, so
        // sibling leaves reach the network in reverse of selection order.
        assert_eq!(network.sent_messages()[0].leaves, vec!["s/1".to_string(), "s/0".to_string()]);
    }

    #[test]
    fn rotates_starting_recipient_across_independent_selects() {
        let policy = Arc::new(RoundRobinPolicy::new());
        let protocol = Arc::new(TestProtocol(policy));

        let first_network = Arc::new(LocalNetwork::new());
        send(protocol.clone(), first_network.clone(), lb_table());
        assert_eq!(first_network.sent_messages()[0].leaves, vec!["s/1".to_string(), "s/0".to_string()]);

        let second_network = Arc::new(LocalNetwork::new());
        send(protocol, second_network.clone(), lb_table());
        assert_eq!(second_network.sent_messages()[0].leaves, vec!["s/0".to_string(), "s/1".to_string()]);
    }

    #[test]
    fn aggregates_every_error_when_all_recipients_fail() {
        let network = Arc::new(LocalNetwork::new());
        network.script_reply("s/0", {
            let mut r = Reply::new(TraceLevel::NONE);
            r.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "down0"));
            r
        });
        network.script_reply("s/1", {
            let mut r = Reply::new(TraceLevel::NONE);
            r.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "down1"));
            r
        });
        let protocol = Arc::new(TestProtocol(Arc::new(RoundRobinPolicy::new())));
        let reply = send(protocol, network, lb_table());
        assert_eq!(reply.num_errors(), 2);
    }
}
