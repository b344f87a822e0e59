//! The trace tree itself: a note, or an interior node holding children.

/// One node in a trace tree. A leaf carries a single note; an interior node
/// carries children plus a `strict` flag that records whether those
/// children are causally ordered (`strict = true`, the default) or a
/// concurrent, unordered group produced by merging sibling subtrees
/// (`strict = false`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceNode {
    note: Option<String>,
    children: Vec<TraceNode>,
    strict: bool,
}

impl TraceNode {
    /// An empty interior node with no children, strict by default.
    #[must_use]
    pub fn new() -> Self {
        Self { note: None, children: Vec::new(), strict: true }
    }

    /// A leaf node carrying a single note.
    #[must_use]
    pub fn leaf(note: impl Into<String>) -> Self {
        Self { note: Some(note.into()), children: Vec::new(), strict: true }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.note.is_some()
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    #[must_use]
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn children(&self) -> &[TraceNode] {
        &self.children
    }

    /// Appends `child` to this node's children. If `child` is itself empty
    /// (no note, no children), this is a no-op, matching the original's
    /// "don't bother recording empty subtrees" behavior.
    pub fn add_child(&mut self, child: TraceNode) -> &mut Self {
        if child.note.is_none() && child.children.is_empty() {
            return self;
        }
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Empties this node of its note and children, leaving it a fresh
    /// interior node.
    pub fn clear(&mut self) {
        self.note = None;
        self.children.clear();
        self.strict = true;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.children.is_empty()
    }

    /// Renders this subtree as a single indented multi-line string, mainly
    /// for test assertions and debug logging.
    #[must_use]
    pub fn to_debug_string(&self) -> String {
        let mut out = String::new();
        self.write_indented(&mut out, 0);
        out
    }

    fn write_indented(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        if let Some(note) = &self.note {
            out.push_str(&pad);
            out.push_str(note);
            out.push('\n');
        }
        for child in &self.children {
            child.write_indented(out, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_an_empty_child_is_a_no_op() {
        let mut node = TraceNode::new();
        node.add_child(TraceNode::new());
        assert_eq!(node.num_children(), 0);
    }

    #[test]
    fn clear_resets_to_a_fresh_node() {
        let mut node = TraceNode::new();
        node.add_child(TraceNode::leaf("a"));
        node.set_strict(false);
        node.clear();
        assert!(node.is_empty());
        assert!(node.strict());
    }

    #[test]
    fn debug_string_nests_children() {
        let mut root = TraceNode::new();
        let mut child = TraceNode::new();
        child.add_child(TraceNode::leaf("inner"));
        root.add_child(TraceNode::leaf("outer"));
        root.add_child(child);
        let rendered = root.to_debug_string();
        assert!(rendered.contains("outer"));
        assert!(rendered.contains("  inner"));
    }
}
