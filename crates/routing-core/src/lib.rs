//! Routing tree resolver, dispatcher, and resender.
//!
//! Takes a [`Message`] and its route, resolves the route into a tree of
//! concrete recipients by repeatedly consulting a [`routing_table::RoutingTable`]
//! and invoking [`RoutingPolicy`]s, dispatches the leaves to a [`Network`]
//! collaborator, merges replies back up the tree, and hands transient
//! failures to a [`Resender`] for backoff retry. The network transport
//! itself, protocol message payloads, and the surrounding message bus
//! façade are out of scope — this crate only calls through the collaborator
//! traits in [`network`] and [`policy`].

mod context;
mod error;
mod local_network;
mod message;
mod network;
mod policy;
mod resender;
mod tree;

pub use context::{ChildHandle, ChildIter, RoutingContext};
pub use error::{Error, ErrorCode};
pub use local_network::{LocalNetwork, SentMessage};
pub use message::{Message, Reply};
pub use network::{LeafHandle, NameMirror, Network, ServiceAddress};
pub use policy::{Protocol, RetryPolicy, RoutingPolicy};
pub use resender::Resender;
pub use tree::RoutingTree;
