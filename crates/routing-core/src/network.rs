//! The collaborator contracts `RoutingTree` depends on but never
//! implements: name-service-backed address allocation, wire transmission,
//! and the name-service mirror a policy can consult. Slobrok-style
//! name-service implementation and the wire codec itself are out of scope —
//! these traits only describe the shape the core calls through.

use crate::error::Error;
use crate::message::Message;

/// An opaque token identifying a destination endpoint, handed back by
/// [`Network::alloc_service_address`] and released through
/// [`Network::free_service_address`]. The core never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAddress(String);

impl ServiceAddress {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The local mirror of the name service, as exposed to a routing policy
/// through [`crate::RoutingContext::mirror`]. Deliberately thin: a policy
/// only ever needs to expand a pattern into the service names currently
/// registered against it.
pub trait NameMirror: Send + Sync {
    /// Expands `pattern` into the service names currently registered
    /// against it. Empty if nothing matches.
    fn lookup(&self, pattern: &str) -> Vec<String>;
}

/// A leaf a [`Network`] implementation has been asked to transmit to: its
/// resolved service name, plus a callback the transport uses to hand the
/// eventual reply back into the tree. Constructed by `routing-core` itself;
/// never by a `Network` implementation.
pub trait LeafHandle: Send {
    /// The service name this leaf resolved to (the concatenation of its
    /// hop's directives).
    fn service_name(&self) -> String;

    /// Delivers the reply for this leaf. Must be called exactly once.
    /// May be called from any thread, including the one that called
    /// [`Network::send`], since the tree is not locked across the call.
    fn handle_reply(&self, reply: crate::message::Reply);
}

/// The transport and name-service collaborator a [`crate::RoutingTree`]
/// dispatches through. `alloc_service_address`/`free_service_address` may
/// consult the name service asynchronously internally, but must complete
/// before returning control to the resolver — the resolver always sees a
/// node that has either an address or a reply, never neither.
pub trait Network: Send + Sync {
    /// Resolves `service_name` to an address, or a reply-worthy error if it
    /// cannot be resolved right now.
    fn alloc_service_address(&self, service_name: &str) -> Result<ServiceAddress, Error>;

    /// Releases a previously allocated address. Called on every
    /// `notifyParent` after the corresponding `send`, whether or not a
    /// reply was ever received.
    fn free_service_address(&self, address: &ServiceAddress);

    /// Enqueues transmission of `message` to every leaf in `leaves`.
    /// Non-blocking: completion is reported asynchronously through each
    /// leaf's [`LeafHandle::handle_reply`].
    fn send(&self, message: &Message, leaves: &[Box<dyn LeafHandle>]);

    /// The name-service mirror policies may consult.
    fn mirror(&self) -> &dyn NameMirror;
}
