//! An in-memory [`Network`] + [`NameMirror`] test double: every address
//! allocation succeeds unless scripted otherwise, every leaf gets a
//! scripted reply (or an empty success by default), and every call is
//! recorded for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use governance_traceability::TraceLevel;

use crate::error::Error;
use crate::message::{Message, Reply};
use crate::network::{LeafHandle, NameMirror, Network, ServiceAddress};

/// One recorded call to [`Network::send`]: the service names of the leaves
/// it carried, in the order they were handed in.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub leaves: Vec<String>,
}

#[derive(Default)]
struct State {
    sent: Vec<SentMessage>,
    alloc_failures: HashMap<String, Error>,
    scripted_replies: HashMap<String, Reply>,
}

/// A `Network` implementation backed by an in-process map rather than a
/// real name service or transport. Replies are delivered synchronously,
/// inline within `send` — this crate's locking discipline (dropping the
/// tree's mutex before calling out to the network) is exactly what makes
/// that safe.
#[derive(Default)]
pub struct LocalNetwork {
    state: Mutex<State>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `alloc_service_address(service_name)` fail with
    /// `error` instead of succeeding.
    pub fn fail_allocation(&self, service_name: impl Into<String>, error: Error) {
        self.state.lock().expect("local network mutex poisoned").alloc_failures.insert(service_name.into(), error);
    }

    /// Scripts the reply delivered the next time a leaf resolved to
    /// `service_name` is sent. Consumed on use; a second send to the same
    /// name falls back to the default empty-success reply.
    pub fn script_reply(&self, service_name: impl Into<String>, reply: Reply) {
        self.state.lock().expect("local network mutex poisoned").scripted_replies.insert(service_name.into(), reply);
    }

    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().expect("local network mutex poisoned").sent.clone()
    }
}

impl Network for LocalNetwork {
    fn alloc_service_address(&self, service_name: &str) -> Result<ServiceAddress, Error> {
        let mut state = self.state.lock().expect("local network mutex poisoned");
        if let Some(error) = state.alloc_failures.remove(service_name) {
            return Err(error);
        }
        Ok(ServiceAddress::new(service_name.to_string()))
    }

    fn free_service_address(&self, _address: &ServiceAddress) {}

    fn send(&self, message: &Message, leaves: &[Box<dyn LeafHandle>]) {
        let _ = message;
        let names: Vec<String> = leaves.iter().map(|leaf| leaf.service_name()).collect();
        self.state.lock().expect("local network mutex poisoned").sent.push(SentMessage { leaves: names });

        for leaf in leaves {
            let reply = {
                let mut state = self.state.lock().expect("local network mutex poisoned");
                state.scripted_replies.remove(&leaf.service_name())
            };
            leaf.handle_reply(reply.unwrap_or_else(|| Reply::new(TraceLevel::NONE)));
        }
    }

    fn mirror(&self) -> &dyn NameMirror {
        self
    }
}

impl NameMirror for LocalNetwork {
    fn lookup(&self, pattern: &str) -> Vec<String> {
        vec![pattern.to_string()]
    }
}
