//! The resolution tree itself: an arena of nodes a [`Message`]'s route is
//! expanded into, plus the resolver/dispatcher logic that walks it.
//!
//! The original tree is parent-owned children holding a raw, non-owning
//! pointer back to their parent — safe there only because destruction
//! always proceeds post-order from the root. Rust has no safe equivalent of
//! that back-pointer without `unsafe`, so the tree is instead an arena:
//! `RoutingTree` owns every `Node` in a `Vec`, and a node refers to its
//! parent and children by [`NodeId`] rather than by pointer.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use routing_model::{Directive, Hop, Route};
use routing_table::RoutingTable;
use governance_traceability::{Trace, TraceLevel, TraceNode};

use crate::context::RoutingContext;
use crate::error::{Error, ErrorCode};
use crate::message::{Message, Reply};
use crate::network::{LeafHandle, Network};
use crate::policy::{Protocol, RoutingPolicy};
use crate::resender::Resender;

/// An index into a [`RoutingTree`]'s node arena. Opaque outside the crate;
/// a policy only ever sees one indirectly, through a [`crate::ChildHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) route: Route,
    pub(crate) recipients: Vec<Route>,
    pub(crate) service_address: Option<crate::network::ServiceAddress>,
    pub(crate) reply: Option<Reply>,
    pub(crate) trace: Trace,
    pub(crate) policy: Option<Arc<dyn RoutingPolicy>>,
    pub(crate) policy_context: Option<Box<dyn Any + Send>>,
    pub(crate) directive_index: usize,
    pub(crate) consumable_errors: HashSet<ErrorCode>,
    pub(crate) pending: usize,
    pub(crate) should_retry: bool,
    pub(crate) select_on_retry: bool,
}

impl Node {
    fn new(parent: Option<NodeId>, route: Route, trace_level: TraceLevel) -> Self {
        Self {
            parent,
            children: Vec::new(),
            route,
            recipients: Vec::new(),
            service_address: None,
            reply: None,
            trace: Trace::new(trace_level),
            policy: None,
            policy_context: None,
            directive_index: 0,
            consumable_errors: HashSet::new(),
            pending: 0,
            should_retry: false,
            select_on_retry: true,
        }
    }
}

enum LookupOutcome {
    Spliced,
    NoMatch,
    Fatal(Error),
}

/// A `Message`'s route being resolved into a tree of service addresses (or
/// an eventual reply). Constructed once per send, including every retry of
/// that send — `prepareForRetry` mutates the same tree in place rather than
/// building a new one.
pub struct RoutingTree {
    self_handle: Weak<Mutex<RoutingTree>>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) message: Message,
    table: Option<Arc<RoutingTable>>,
    protocol: Arc<dyn Protocol>,
    network: Arc<dyn Network>,
    resender: Option<Arc<Resender>>,
    reply_handler: Option<Box<dyn FnOnce(Reply) + Send>>,
    discard_handler: Option<Box<dyn FnOnce() + Send>>,
    discarded: bool,
    trace_level: TraceLevel,
}

impl RoutingTree {
    /// Builds a fresh tree rooted at `message.route()`, ready for
    /// [`RoutingTree::send`]. `reply_handler` is invoked exactly once, from
    /// a dedicated thread (never the thread that drove resolution), with
    /// the tree's final reply — unless [`RoutingTree::discard`] is called
    /// first, in which case `discard_handler` runs instead and
    /// `reply_handler` never does.
    #[must_use]
    pub fn new(
        message: Message,
        table: Option<Arc<RoutingTable>>,
        protocol: Arc<dyn Protocol>,
        network: Arc<dyn Network>,
        resender: Option<Arc<Resender>>,
        trace_level: TraceLevel,
        reply_handler: impl FnOnce(Reply) + Send + 'static,
        discard_handler: impl FnOnce() + Send + 'static,
    ) -> Arc<Mutex<RoutingTree>> {
        Arc::new_cyclic(|weak| {
            let route = message.route().clone();
            let root = Node::new(None, route, trace_level);
            Mutex::new(RoutingTree {
                self_handle: weak.clone(),
                nodes: vec![root],
                root: NodeId(0),
                message,
                table,
                protocol,
                network,
                resender,
                reply_handler: Some(Box::new(reply_handler)),
                discard_handler: Some(Box::new(discard_handler)),
                discarded: false,
                trace_level,
            })
        })
    }

    /// Root-only entry point: resolves the tree (if not already resolved),
    /// aborts on unconsumed errors, and otherwise hands every ready leaf to
    /// the network collaborator. A no-op if resolution produced nothing to
    /// transmit (the reply, if any, has already been finalized internally).
    pub fn send(tree_handle: &Arc<Mutex<RoutingTree>>) {
        let (leaves, message, network) = {
            let mut tree = tree_handle.lock().expect("routing tree mutex poisoned");
            let leaves = tree.collect_transmission();
            if leaves.is_empty() {
                return;
            }
            (leaves, tree.message.clone(), Arc::clone(&tree.network))
        };
        let handles: Vec<Box<dyn LeafHandle>> = leaves
            .into_iter()
            .map(|id| Box::new(TreeLeafHandle { tree: Arc::clone(tree_handle), node: id }) as Box<dyn LeafHandle>)
            .collect();
        network.send(&message, &handles);
    }

    /// Marks the tree discarded: the reply handler is dropped without ever
    /// being called, the discard handler (if any) is invoked instead, and
    /// no further retries are scheduled for it. May be called once, during
    /// shutdown.
    pub fn discard(tree_handle: &Arc<Mutex<RoutingTree>>) {
        let handler = {
            let mut tree = tree_handle.lock().expect("routing tree mutex poisoned");
            tree.reply_handler = None;
            tree.discarded = true;
            tree.discard_handler.take()
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    fn deliver_leaf_reply(tree_handle: &Arc<Mutex<RoutingTree>>, node: NodeId, reply: Reply) {
        let mut tree = tree_handle.lock().expect("routing tree mutex poisoned");
        tree.set_reply(node, reply);
        tree.notify_parent(node);
    }

    /// Runs resolution and returns the leaves ready for transmission, or an
    /// empty vector if nothing needs to be sent over the network — either
    /// because resolution failed outright, because unconsumed errors
    /// aborted the send, or because the whole tree already has a complete
    /// reply. All of this happens while the tree's mutex is held; the
    /// caller drops the lock before calling out to the network, so that a
    /// synchronous `Network` implementation calling back into
    /// `handle_reply` does not deadlock against this same mutex.
    fn collect_transmission(&mut self) -> Vec<NodeId> {
        let root = self.root;
        self.resolve(root, 0);
        // `resolve` may already have set an error reply directly on a
        // childless root (e.g. an illegal route, or a leaf allocation
        // failure with nowhere else to branch). `notify_abort` only ever
        // aborts *descendant* leaves still missing a reply, so when the
        // root itself is the failing node and has no children there is
        // nothing for it to find — go straight to `notify_parent` (after
        // still letting `has_unconsumed_errors` flag the error retryable)
        // so the reply is actually delivered instead of silently dropped.
        if self.nodes[root.0].children.is_empty() && self.nodes[root.0].reply.is_some() {
            self.has_unconsumed_errors(root);
            self.notify_parent(root);
            return Vec::new();
        }
        if self.has_unconsumed_errors(root) {
            // `notify_abort` recurses all the way up to `finish_root` before
            // returning, so the reply (or a scheduled retry) is already
            // handled; nothing left to transmit.
            self.notify_abort(root, "Errors found while resolving route.");
            return Vec::new();
        }
        if self.nodes[root.0].reply.is_some() {
            self.notify_parent(root);
            return Vec::new();
        }
        self.collect_leaves_with_address(root)
    }

    fn collect_leaves_with_address(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if self.nodes[cur.0].service_address.is_some() {
                out.push(cur);
            } else {
                stack.extend(self.nodes[cur.0].children.iter().copied());
            }
        }
        out
    }

    fn resolve(&mut self, id: NodeId, depth: u32) -> bool {
        if !self.nodes[id.0].route.has_hops() {
            self.set_error(id, Error::new(ErrorCode::ILLEGAL_ROUTE, "Route has no hops."));
            return false;
        }
        if !self.nodes[id.0].children.is_empty() {
            return self.resolve_children(id, depth + 1);
        }

        let mut depth = depth;
        loop {
            let spliced = if self.lookup_hop(id) {
                true
            } else {
                match self.lookup_route(id) {
                    LookupOutcome::Spliced => true,
                    LookupOutcome::NoMatch => false,
                    LookupOutcome::Fatal(error) => {
                        self.set_error(id, error);
                        return false;
                    }
                }
            };
            if !spliced {
                break;
            }
            depth += 1;
            if depth > 64 {
                self.set_error(id, Error::new(ErrorCode::ILLEGAL_ROUTE, "Too many levels of recursion."));
                return false;
            }
        }

        let hop0 = self.nodes[id.0].route.hop(0).clone();
        if let Some(msg) = Self::find_error_directive(&hop0) {
            self.set_error(id, Error::new(ErrorCode::ILLEGAL_ROUTE, msg));
            return false;
        }

        if let Some(directive_index) = Self::find_policy_directive(&hop0) {
            return self.execute_policy_select(id, directive_index, depth);
        }

        let service_name = hop0.service_name();
        match self.network.alloc_service_address(&service_name) {
            Ok(address) => {
                self.nodes[id.0].service_address = Some(address);
                true
            }
            Err(error) => {
                self.set_error(id, error);
                false
            }
        }
    }

    fn find_error_directive(hop: &Hop) -> Option<String> {
        (0..hop.num_directives()).find_map(|i| match hop.directive(i) {
            Some(Directive::Error(msg)) => Some(msg.clone()),
            _ => None,
        })
    }

    fn find_policy_directive(hop: &Hop) -> Option<usize> {
        (0..hop.num_directives()).find(|&i| matches!(hop.directive(i), Some(Directive::Policy { .. })))
    }

    fn lookup_hop(&mut self, id: NodeId) -> bool {
        let Some(table) = self.table.as_ref() else { return false };
        let route = self.nodes[id.0].route.clone();
        let name = route.hop(0).service_name();
        let Some(blueprint) = table.hop(&name) else { return false };

        let selector = (0..blueprint.num_directives()).map(|i| blueprint.directive(i).clone()).collect();
        let new_hop = Hop::new(selector, blueprint.ignore_result());
        let tail: Vec<Hop> = (1..route.num_hops()).map(|i| route.hop(i).clone()).collect();

        let mut new_route = Route::new();
        new_route.add_hop(new_hop);
        for hop in &tail {
            new_route.add_hop(hop.clone());
        }

        let mut recipients = Vec::with_capacity(blueprint.num_recipients());
        for i in 0..blueprint.num_recipients() {
            let mut candidate = Route::new();
            candidate.add_hop(blueprint.recipient(i).clone());
            for hop in &tail {
                candidate.add_hop(hop.clone());
            }
            recipients.push(candidate);
        }

        let node = &mut self.nodes[id.0];
        node.route = new_route;
        node.recipients = recipients;
        true
    }

    fn lookup_route(&mut self, id: NodeId) -> LookupOutcome {
        let route = self.nodes[id.0].route.clone();
        let hop0 = route.hop(0).clone();
        let tail: Vec<Hop> = (1..route.num_hops()).map(|i| route.hop(i).clone()).collect();

        if let Some(Directive::Route(name)) = hop0.directive(0) {
            let name = name.clone();
            let named = self.table.as_ref().and_then(|table| table.route(&name).cloned());
            return match named {
                Some(named) => {
                    let mut spliced = named;
                    for hop in &tail {
                        spliced.add_hop(hop.clone());
                    }
                    self.nodes[id.0].route = spliced;
                    LookupOutcome::Spliced
                }
                None => LookupOutcome::Fatal(Error::new(
                    ErrorCode::ILLEGAL_ROUTE,
                    format!("Route '{name}' does not exist."),
                )),
            };
        }

        if let Some(table) = self.table.as_ref() {
            let name = hop0.service_name();
            if let Some(named) = table.route(&name).cloned() {
                let mut spliced = named;
                for hop in &tail {
                    spliced.add_hop(hop.clone());
                }
                self.nodes[id.0].route = spliced;
                return LookupOutcome::Spliced;
            }
        }

        LookupOutcome::NoMatch
    }

    fn execute_policy_select(&mut self, id: NodeId, directive_index: usize, depth: u32) -> bool {
        let hop0 = self.nodes[id.0].route.hop(0).clone();
        let (name, param) = match hop0.directive(directive_index) {
            Some(Directive::Policy { name, param }) => (name.clone(), param.clone()),
            _ => unreachable!("directive_index located by find_policy_directive"),
        };

        let Some(policy) = self.protocol.create_policy(&name, &param) else {
            self.set_error(id, Error::new(ErrorCode::UNKNOWN_POLICY, format!("Unknown routing policy '{name}'.")));
            return false;
        };
        self.nodes[id.0].policy = Some(Arc::clone(&policy));
        self.nodes[id.0].directive_index = directive_index;

        let children_before = self.nodes[id.0].children.len();
        let outcome = {
            let mut ctx = RoutingContext::new(self, id, directive_index);
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| policy.select(&mut ctx)))
        };
        if outcome.is_err() {
            self.set_error(id, Error::new(ErrorCode::POLICY_ERROR, "Policy panicked during select."));
            return false;
        }

        let children_after = self.nodes[id.0].children.len();
        if children_after > children_before {
            self.trace(
                id,
                TraceLevel::SPLIT_MERGE,
                format!("Split into {} children.", children_after - children_before),
            );
            return self.resolve_children(id, depth + 1);
        }
        if self.nodes[id.0].reply.is_none() {
            self.set_error(id, Error::new(ErrorCode::NO_SERVICES_FOR_ROUTE, "Policy selected no recipients."));
            return false;
        }
        true
    }

    /// Resolves every child still missing a reply, leaving children that
    /// already carry one (survivors of a partial retry, see
    /// `prepare_for_retry`) untouched. `pending` is recomputed from the
    /// active set on each pass rather than trusting whatever `add_child`
    /// left behind, so a retry round that only re-resolves some children
    /// still merges once exactly that many have reported back.
    fn resolve_children(&mut self, id: NodeId, depth: u32) -> bool {
        let children = self.nodes[id.0].children.clone();
        let active: Vec<NodeId> = children.into_iter().filter(|child| self.nodes[child.0].reply.is_none()).collect();
        self.nodes[id.0].pending = active.len();
        for child in active {
            self.resolve(child, depth);
            if self.nodes[child.0].reply.is_some() {
                self.notify_parent(child);
            }
        }
        true
    }

    fn notify_merge(&mut self, id: NodeId) {
        let pending = {
            let node = &mut self.nodes[id.0];
            node.pending = node.pending.saturating_sub(1);
            node.pending
        };
        if pending != 0 {
            return;
        }

        if self.trace_level != TraceLevel::NONE {
            let children = self.nodes[id.0].children.clone();
            let mut subtree = TraceNode::new();
            subtree.set_strict(false);
            for child in children {
                let child_root = match &self.nodes[child.0].reply {
                    Some(reply) => reply.trace().root().clone(),
                    None => self.nodes[child.0].trace.root().clone(),
                };
                subtree.add_child(child_root);
            }
            self.nodes[id.0].trace.root_mut().add_child(subtree);
        }

        let policy = self.nodes[id.0].policy.clone();
        let directive_index = self.nodes[id.0].directive_index;
        let merged_ok = match policy {
            Some(policy) => {
                let mut ctx = RoutingContext::new(self, id, directive_index);
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| policy.merge(&mut ctx))).is_ok()
            }
            None => true,
        };

        if !merged_ok {
            self.set_error(id, Error::new(ErrorCode::POLICY_ERROR, "Policy panicked during merge."));
        } else if self.nodes[id.0].reply.is_none() {
            self.set_error(id, Error::new(ErrorCode::APP_FATAL_ERROR, "Policy failed to merge replies."));
        }

        self.notify_parent(id);
    }

    fn notify_parent(&mut self, id: NodeId) {
        if let Some(address) = self.nodes[id.0].service_address.take() {
            self.network.free_service_address(&address);
        }
        self.try_ignore_result(id);
        match self.nodes[id.0].parent {
            Some(parent) => self.notify_merge(parent),
            None => self.finish_root(id),
        }
    }

    /// If this node's hop has `ignoreResult` set and its reply carries
    /// errors, replaces the reply with an empty one, dropping the errors on
    /// this branch.
    fn try_ignore_result(&mut self, id: NodeId) {
        if !self.nodes[id.0].route.hop(0).ignore_result() {
            return;
        }
        let has_errors = self.nodes[id.0].reply.as_ref().is_some_and(Reply::has_errors);
        if has_errors {
            self.nodes[id.0].reply = Some(Reply::new(self.trace_level));
        }
    }

    fn finish_root(&mut self, root: NodeId) {
        if self.discarded {
            return;
        }
        if self.nodes[root.0].should_retry {
            if let (Some(resender), Some(handle)) = (self.resender.clone(), self.self_handle.upgrade()) {
                if resender.try_schedule_retry(self, handle) {
                    return;
                }
            }
        }
        let reply = self.nodes[root.0].reply.take().unwrap_or_else(|| Reply::new(self.trace_level));
        if let Some(handler) = self.reply_handler.take() {
            std::thread::spawn(move || handler(reply));
        }
    }

    fn has_unconsumed_errors(&mut self, root: NodeId) -> bool {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(reply) = self.nodes[id.0].reply.clone() {
                for error in reply.errors() {
                    if self.is_consumable_by_ancestors(id, error.code()) {
                        continue;
                    }
                    let retryable = self.resender.as_ref().is_some_and(|r| r.can_retry(error.code()));
                    if retryable {
                        self.nodes[root.0].should_retry = true;
                        continue;
                    }
                    return true;
                }
            } else {
                stack.extend(self.nodes[id.0].children.iter().copied());
            }
        }
        false
    }

    fn is_consumable_by_ancestors(&self, id: NodeId, code: ErrorCode) -> bool {
        let mut cur = self.nodes[id.0].parent;
        while let Some(parent) = cur {
            if self.nodes[parent.0].consumable_errors.contains(&code) {
                return true;
            }
            cur = self.nodes[parent.0].parent;
        }
        false
    }

    pub(crate) fn prepare_for_retry(&mut self, id: NodeId) {
        self.nodes[id.0].should_retry = false;
        self.nodes[id.0].reply = None;
        if self.nodes[id.0].select_on_retry || self.nodes[id.0].children.is_empty() {
            self.discard_children(id);
            return;
        }
        let children = self.nodes[id.0].children.clone();
        let mut any_recursed = false;
        for child in children {
            if self.nodes[child.0].should_retry || self.nodes[child.0].reply.is_none() {
                self.prepare_for_retry(child);
                any_recursed = true;
            }
        }
        if !any_recursed {
            self.discard_children(id);
        }
    }

    fn discard_children(&mut self, id: NodeId) {
        self.nodes[id.0].children.clear();
        self.nodes[id.0].pending = 0;
        self.nodes[id.0].policy = None;
        self.nodes[id.0].policy_context = None;
    }

    fn notify_abort(&mut self, root: NodeId, message: &str) {
        let leaves = self.collect_active_leaves_without_reply(root);
        for leaf in leaves {
            self.set_error(leaf, Error::new(ErrorCode::SEND_ABORTED, message.to_string()));
            self.notify_parent(leaf);
        }
    }

    fn collect_active_leaves_without_reply(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if self.nodes[cur.0].reply.is_some() {
                continue;
            }
            if self.nodes[cur.0].children.is_empty() {
                out.push(cur);
            } else {
                stack.extend(self.nodes[cur.0].children.iter().copied());
            }
        }
        out
    }

    pub(crate) fn set_reply(&mut self, id: NodeId, mut reply: Reply) {
        let accumulated = std::mem::replace(&mut self.nodes[id.0].trace, Trace::new(self.trace_level));
        for child in accumulated.root().children() {
            reply.trace_mut().root_mut().add_child(child.clone());
        }
        self.nodes[id.0].reply = Some(reply);
    }

    pub(crate) fn set_error(&mut self, id: NodeId, error: Error) {
        tracing::debug!(
            trace_id = %self.message.trace_id(),
            code = error.code().0,
            message = error.message(),
            "routing node error"
        );
        let mut reply = self.take_or_new_reply(id);
        reply.set_error(error);
        self.set_reply(id, reply);
    }

    pub(crate) fn add_error(&mut self, id: NodeId, error: Error) {
        let mut reply = self.take_or_new_reply(id);
        reply.add_error(error);
        self.set_reply(id, reply);
    }

    fn take_or_new_reply(&mut self, id: NodeId) -> Reply {
        self.nodes[id.0].reply.take().unwrap_or_else(|| Reply::new(self.trace_level))
    }

    pub(crate) fn trace(&mut self, id: NodeId, level: TraceLevel, note: impl Into<String>) {
        self.nodes[id.0].trace.trace(level, note);
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, route: Route) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(Some(parent), route, self.trace_level));
        self.nodes[parent.0].children.push(id);
        self.nodes[parent.0].pending += 1;
        id
    }

    pub(crate) fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub(crate) fn message(&self) -> &Message {
        &self.message
    }
}

struct TreeLeafHandle {
    tree: Arc<Mutex<RoutingTree>>,
    node: NodeId,
}

impl LeafHandle for TreeLeafHandle {
    fn service_name(&self) -> String {
        let tree = self.tree.lock().expect("routing tree mutex poisoned");
        tree.nodes[self.node.0].route.hop(0).service_name()
    }

    fn handle_reply(&self, reply: Reply) {
        RoutingTree::deliver_leaf_reply(&self.tree, self.node, reply);
    }
}
