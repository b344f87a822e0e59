//! The façade a [`crate::RoutingPolicy`] sees: the hop it is resolving, the
//! recipients it may choose among, and the means to add children, read
//! their replies, and set its own.

use std::any::Any;

use governance_traceability::{Trace, TraceLevel};
use routing_model::{Hop, Route};

use crate::error::{Error, ErrorCode};
use crate::message::{Message, Reply};
use crate::network::NameMirror;
use crate::tree::{NodeId, RoutingTree};

/// Handed to a [`crate::RoutingPolicy`]'s `select`/`merge` for exactly the
/// duration of that call. Scoped to a single node, so a policy can never
/// reach outside the subtree it owns.
pub struct RoutingContext<'a> {
    tree: &'a mut RoutingTree,
    node: NodeId,
    directive_index: usize,
}

impl<'a> RoutingContext<'a> {
    pub(crate) fn new(tree: &'a mut RoutingTree, node: NodeId, directive_index: usize) -> Self {
        Self { tree, node, directive_index }
    }

    /// The hop currently being resolved, after any hop-table or named-route
    /// splicing has already happened.
    #[must_use]
    pub fn hop(&self) -> &Hop {
        self.tree.nodes[self.node.0].route.hop(0)
    }

    /// The index, within [`Self::hop`]'s selector, of the policy directive
    /// this call is resolving.
    #[must_use]
    pub fn directive_index(&self) -> usize {
        self.directive_index
    }

    /// The directives of [`Self::hop`] before [`Self::directive_index`],
    /// rendered back to route-expression text.
    #[must_use]
    pub fn hop_prefix(&self) -> String {
        self.hop().prefix(self.directive_index)
    }

    /// The directives of [`Self::hop`] after [`Self::directive_index`],
    /// rendered back to route-expression text.
    #[must_use]
    pub fn hop_suffix(&self) -> String {
        self.hop().suffix(self.directive_index)
    }

    #[must_use]
    pub fn has_recipients(&self) -> bool {
        !self.tree.nodes[self.node.0].recipients.is_empty()
    }

    #[must_use]
    pub fn num_recipients(&self) -> usize {
        self.tree.nodes[self.node.0].recipients.len()
    }

    #[must_use]
    pub fn recipient(&self, i: usize) -> &Route {
        &self.tree.nodes[self.node.0].recipients[i]
    }

    #[must_use]
    pub fn recipients(&self) -> &[Route] {
        &self.tree.nodes[self.node.0].recipients
    }

    /// Recipients whose first hop structurally matches [`Self::hop`] (same
    /// directive count, pairwise [`routing_model::Directive::matches`]) —
    /// meant for policies layered over other policy directives, where a
    /// recipient is itself e.g. `[Dispatch:a]` and only candidates sharing
    /// the current hop's shape are eligible. Each match is rebuilt with
    /// `hop(0)` set to a copy of the current hop whose directive at
    /// [`Self::directive_index`] is swapped in from the recipient, and
    /// deduplicated by that swapped directive's rendered text — so two
    /// recipients differing only beyond the matched hop collapse to one.
    ///
    /// Most fan-out policies (round-robin, broadcast) want every configured
    /// recipient unconditionally and should use [`Self::recipients`]
    /// instead, since their recipients are plain verbatim targets that
    /// would never structurally match a policy-directive hop.
    #[must_use]
    pub fn get_matched_recipients(&self) -> Vec<Route> {
        let hop = self.hop().clone();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for candidate in self.recipients() {
            if !candidate.has_hops() || !hop.matches(candidate.hop(0)) {
                continue;
            }
            let Some(dir) = candidate.hop(0).directive(self.directive_index).cloned() else {
                continue;
            };
            if !seen.insert(dir.to_string()) {
                continue;
            }
            let mut rebuilt = candidate.clone();
            let mut new_hop0 = hop.clone();
            new_hop0.set_directive(self.directive_index, dir);
            rebuilt.set_hop(0, new_hop0);
            out.push(rebuilt);
        }
        out
    }

    #[must_use]
    pub fn mirror(&self) -> &dyn NameMirror {
        self.tree.network().mirror()
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        self.tree.message()
    }

    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        self.tree.nodes[self.node.0].reply.as_ref()
    }

    pub fn set_reply(&mut self, reply: Reply) {
        self.tree.set_reply(self.node, reply);
    }

    pub fn set_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.tree.set_error(self.node, Error::new(code, message));
    }

    pub fn add_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.tree.add_error(self.node, Error::new(code, message));
    }

    /// Marks `code` as consumable by this node: an unconsumed-error scan
    /// that reaches this node from a descendant carrying `code` treats it
    /// as handled rather than fatal.
    pub fn add_consumable_error(&mut self, code: ErrorCode) {
        self.tree.nodes[self.node.0].consumable_errors.insert(code);
    }

    #[must_use]
    pub fn is_consumable_error(&self, code: ErrorCode) -> bool {
        self.tree.nodes[self.node.0].consumable_errors.contains(&code)
    }

    /// Whether a retry of this node re-runs `select` from scratch (the
    /// default) or instead retries only the children that themselves need
    /// it, keeping everything else already resolved.
    #[must_use]
    pub fn select_on_retry(&self) -> bool {
        self.tree.nodes[self.node.0].select_on_retry
    }

    pub fn set_select_on_retry(&mut self, select_on_retry: bool) {
        self.tree.nodes[self.node.0].select_on_retry = select_on_retry;
    }

    /// Opaque state a policy stashes during `select` and reads back during
    /// `merge`, e.g. which recipient it round-robined to.
    #[must_use]
    pub fn policy_context(&self) -> Option<&(dyn Any + Send)> {
        self.tree.nodes[self.node.0].policy_context.as_deref()
    }

    pub fn set_policy_context(&mut self, context: Box<dyn Any + Send>) {
        self.tree.nodes[self.node.0].policy_context = Some(context);
    }

    pub fn trace(&mut self, level: TraceLevel, note: impl Into<String>) {
        self.tree.trace(self.node, level, note);
    }

    /// Adds a child node to resolve `route` against, returning its index
    /// among this node's children (not a stable identifier; only valid
    /// until this node's children are next discarded).
    pub fn add_child(&mut self, route: Route) -> usize {
        self.tree.add_child(self.node, route);
        self.tree.nodes[self.node.0].children.len() - 1
    }

    /// Iterates this node's children, most-recently-added last.
    #[must_use]
    pub fn child_iter(&self) -> ChildIter<'_> {
        let tree: &RoutingTree = self.tree;
        ChildIter { tree, children: tree.nodes[self.node.0].children.iter() }
    }
}

/// Iterates a node's children as read-only handles, replacing the original
/// cursor-style iterator with a normal Rust `Iterator`.
pub struct ChildIter<'a> {
    tree: &'a RoutingTree,
    children: std::slice::Iter<'a, NodeId>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = ChildHandle<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.children.next().map(|&node| ChildHandle { tree: self.tree, node })
    }
}

/// A read-only view of one child node, as seen from its parent's policy.
pub struct ChildHandle<'a> {
    tree: &'a RoutingTree,
    node: NodeId,
}

impl<'a> ChildHandle<'a> {
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.tree.nodes[self.node.0].route
    }

    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        self.tree.nodes[self.node.0].reply.as_ref()
    }

    #[must_use]
    pub fn has_reply(&self) -> bool {
        self.reply().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use governance_traceability::TraceLevel;

    use super::*;
    use crate::local_network::LocalNetwork;
    use crate::policy::{Protocol, RoutingPolicy};
    use crate::Message;

    struct NoPolicyProtocol;
    impl Protocol for NoPolicyProtocol {
        fn name(&self) -> &str {
            "test"
        }
        fn create_policy(&self, _name: &str, _param: &str) -> Option<Arc<dyn RoutingPolicy>> {
            None
        }
    }

    #[test]
    fn get_matched_recipients_dedups_identical_routes() {
        let network = Arc::new(LocalNetwork::new());
        let message = Message::new("test", Route::parse("search/0"));
        let tree = RoutingTree::new(
            message,
            None,
            Arc::new(NoPolicyProtocol),
            network,
            None,
            TraceLevel::NONE,
            |_| {},
            || {},
        );
        let mut guard = tree.lock().expect("poisoned");
        let root = guard.root;
        let recipient = Route::parse("search/0");
        guard.nodes[root.0].recipients = vec![recipient.clone(), recipient];
        let ctx = RoutingContext::new(&mut guard, root, 0);
        assert_eq!(ctx.get_matched_recipients().len(), 1);
        drop(ctx);
    }
}
