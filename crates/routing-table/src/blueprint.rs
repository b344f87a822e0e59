//! A stored, already-parsed prototype of a hop, compiled once from a
//! [`crate::HopSpec`] and kept in a [`crate::RoutingTable`].

use routing_model::{Directive, Hop};

use crate::spec::HopSpec;

/// A compiled hop: its directive selector plus the recipient hops the
/// selector is allowed to choose from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopBlueprint {
    selector: Vec<Directive>,
    recipients: Vec<Hop>,
    ignore_result: bool,
}

impl HopBlueprint {
    /// Compiles a blueprint from its spec, parsing the selector and every
    /// recipient once up front.
    #[must_use]
    pub fn new(spec: &HopSpec) -> Self {
        let hop = Hop::parse(spec.selector());
        let selector = (0..hop.num_directives())
            .map(|i| hop.directive(i).expect("index in bounds").clone())
            .collect();
        let recipients = (0..spec.num_recipients()).map(|i| Hop::parse(spec.recipient(i))).collect();
        Self { selector, recipients, ignore_result: spec.ignore_result() }
    }

    /// Instantiates a live hop from this blueprint.
    #[must_use]
    pub fn create(&self) -> Hop {
        Hop::new(self.selector.clone(), self.ignore_result)
    }

    #[must_use]
    pub fn has_directives(&self) -> bool {
        !self.selector.is_empty()
    }

    #[must_use]
    pub fn num_directives(&self) -> usize {
        self.selector.len()
    }

    #[must_use]
    pub fn directive(&self, i: usize) -> &Directive {
        &self.selector[i]
    }

    #[must_use]
    pub fn has_recipients(&self) -> bool {
        !self.recipients.is_empty()
    }

    #[must_use]
    pub fn num_recipients(&self) -> usize {
        self.recipients.len()
    }

    #[must_use]
    pub fn recipient(&self, i: usize) -> &Hop {
        &self.recipients[i]
    }

    #[must_use]
    pub fn ignore_result(&self) -> bool {
        self.ignore_result
    }
}

impl std::fmt::Display for HopBlueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let selector: Vec<String> = self.selector.iter().map(|d| format!("'{d}'")).collect();
        let recipients: Vec<String> = self.recipients.iter().map(|h| format!("'{h}'")).collect();
        write!(
            f,
            "HopBlueprint(selector = {{ {} }}, recipients = {{ {} }}, ignoreResult = {})",
            selector.join(", "),
            recipients.join(", "),
            self.ignore_result
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_selector_and_recipients_from_spec() {
        let spec = HopSpec::new("indexing", "[Content]").add_recipient("search/0").add_recipient("search/1");
        let blueprint = HopBlueprint::new(&spec);
        assert_eq!(blueprint.num_directives(), 1);
        assert!(matches!(blueprint.directive(0), Directive::Policy { .. }));
        assert_eq!(blueprint.num_recipients(), 2);
        assert_eq!(blueprint.recipient(0).service_name(), "search/0");
    }

    #[test]
    fn create_instantiates_a_fresh_hop_each_time() {
        let spec = HopSpec::new("h", "search/0");
        let blueprint = HopBlueprint::new(&spec);
        let a = blueprint.create();
        let b = blueprint.create();
        assert_eq!(a, b);
    }
}
