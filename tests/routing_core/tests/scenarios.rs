//! End-to-end resolution scenarios exercising `routing-core` purely through
//! its public API, with `LocalNetwork` standing in for a real transport.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use governance_traceability::TraceLevel;
use routing_core::{Error, ErrorCode, LocalNetwork, Message, Protocol, Reply, Resender, RoutingPolicy, RoutingTree};
use routing_model::Route;
use routing_table::{HopSpec, RouteSpec, RoutingTable, RoutingTableSpec};
use runtime_policy::{AllOfPolicy, RetryTransientErrorsPolicy, RoundRobinPolicy};

struct TestProtocol {
    round_robin: Arc<RoundRobinPolicy>,
    all_of: Arc<AllOfPolicy>,
}

impl TestProtocol {
    fn new() -> Self {
        Self { round_robin: Arc::new(RoundRobinPolicy::new()), all_of: Arc::new(AllOfPolicy::new()) }
    }
}

impl Protocol for TestProtocol {
    fn name(&self) -> &str {
        "test"
    }

    fn create_policy(&self, name: &str, _param: &str) -> Option<Arc<dyn RoutingPolicy>> {
        match name {
            "RoundRobin" => Some(self.round_robin.clone() as Arc<dyn RoutingPolicy>),
            "AllOf" => Some(self.all_of.clone() as Arc<dyn RoutingPolicy>),
            _ => None,
        }
    }
}

fn send_and_wait(
    message: Message,
    table: Option<Arc<RoutingTable>>,
    network: Arc<LocalNetwork>,
    resender: Option<Arc<Resender>>,
) -> Reply {
    let (tx, rx) = mpsc::channel();
    let tree = RoutingTree::new(
        message,
        table,
        Arc::new(TestProtocol::new()),
        network,
        resender,
        TraceLevel::NONE,
        move |reply| {
            let _ = tx.send(reply);
        },
        || {},
    );
    RoutingTree::send(&tree);
    rx.recv_timeout(Duration::from_secs(2)).expect("reply delivered within timeout")
}

#[test]
fn simple_verbatim_route_reaches_a_single_recipient() {
    let network = Arc::new(LocalNetwork::new());
    let reply = send_and_wait(Message::new("test", Route::parse("search/0")), None, network.clone(), None);
    assert!(!reply.has_errors());
    assert_eq!(network.sent_messages()[0].leaves, vec!["search/0".to_string()]);
}

#[test]
fn named_route_expands_through_the_routing_table() {
    let spec = RoutingTableSpec::new("test")
        .add_route(RouteSpec::new("default").add_hop("route:inner").add_hop("search/0"))
        .add_route(RouteSpec::new("inner").add_hop("search/1"));
    let table = Arc::new(RoutingTable::new(&spec));
    let network = Arc::new(LocalNetwork::new());
    let reply = send_and_wait(Message::new("test", Route::parse("default")), Some(table), network, None);
    assert!(!reply.has_errors());
}

#[test]
fn round_robin_policy_fans_out_and_merges_the_first_success() {
    let spec = RoutingTableSpec::new("test")
        .add_hop(HopSpec::new("lb", "[RoundRobin]").add_recipient("search/0").add_recipient("search/1"));
    let table = Arc::new(RoutingTable::new(&spec));
    let network = Arc::new(LocalNetwork::new());
    network.script_reply("search/0", {
        let mut reply = Reply::new(TraceLevel::NONE);
        reply.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "overloaded"));
        reply
    });
    let reply = send_and_wait(Message::new("test", Route::parse("lb")), Some(table), network.clone(), None);
    assert!(!reply.has_errors());
    assert_eq!(network.sent_messages()[0].leaves.len(), 2);
}

#[test]
fn ignore_result_swallows_a_leaf_error() {
    let spec = RoutingTableSpec::new("test").add_hop(HopSpec::new("best-effort", "search/0").set_ignore_result(true));
    let table = Arc::new(RoutingTable::new(&spec));
    let network = Arc::new(LocalNetwork::new());
    network.script_reply("search/0", {
        let mut reply = Reply::new(TraceLevel::NONE);
        reply.add_error(Error::new(ErrorCode::TRANSIENT_ERROR, "down"));
        reply
    });
    let reply = send_and_wait(Message::new("test", Route::parse("best-effort")), Some(table), network, None);
    assert!(!reply.has_errors());
}

#[test]
fn transient_failure_retries_then_times_out_against_a_short_deadline() {
    let network = Arc::new(LocalNetwork::new());
    network.fail_allocation("flaky/0", Error::new(ErrorCode::TRANSIENT_ERROR, "connection refused"));
    let retry_policy = Arc::new(RetryTransientErrorsPolicy::new());
    retry_policy.set_base_delay(1.0);
    let resender = Resender::new(retry_policy);

    let message = Message::new("test", Route::parse("flaky/0"))
        .set_retry_enabled(true)
        .set_time_to_live(Duration::from_millis(10));
    let reply = send_and_wait(message, None, network, Some(resender));
    assert_eq!(reply.errors()[0].code(), ErrorCode::TIMEOUT);
}

#[test]
fn all_of_policy_aborts_the_pending_sibling_on_a_fatal_leaf_error() {
    let spec = RoutingTableSpec::new("test")
        .add_hop(HopSpec::new("fanout", "[AllOf]").add_recipient("search/0").add_recipient("search/1"));
    let table = Arc::new(RoutingTable::new(&spec));
    let network = Arc::new(LocalNetwork::new());
    network.fail_allocation("search/0", Error::new(ErrorCode::UNKNOWN_POLICY, "no such service"));
    let reply = send_and_wait(Message::new("test", Route::parse("fanout")), Some(table), network.clone(), None);
    assert_eq!(reply.num_errors(), 2);
    let codes: Vec<ErrorCode> = reply.errors().iter().map(Error::code).collect();
    assert!(codes.contains(&ErrorCode::UNKNOWN_POLICY));
    assert!(codes.contains(&ErrorCode::SEND_ABORTED));
    assert!(network.sent_messages().is_empty());
}
