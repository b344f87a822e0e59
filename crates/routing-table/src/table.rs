//! At any time there is zero or one routing table registered per protocol.
//! A table holds the named hops and routes that resolution may substitute
//! references to.

use std::collections::BTreeMap;

use routing_model::{Hop, Route};

use crate::blueprint::HopBlueprint;
use crate::spec::RoutingTableSpec;

/// A compiled routing table for a single protocol: named hop blueprints plus
/// named routes, both keyed by their protocol-unique name.
///
/// Backed by `BTreeMap` rather than a hand-rolled cursor type, so hops and
/// routes are walked with the standard `Iterator` the rest of the crate
/// already expects.
#[derive(Debug)]
pub struct RoutingTable {
    name: String,
    hops: BTreeMap<String, HopBlueprint>,
    routes: BTreeMap<String, Route>,
}

impl RoutingTable {
    /// Compiles a table from its spec.
    #[must_use]
    pub fn new(spec: &RoutingTableSpec) -> Self {
        let mut hops = BTreeMap::new();
        for i in 0..spec.num_hops() {
            let hop_spec = spec.hop(i);
            hops.insert(hop_spec.name().to_string(), HopBlueprint::new(hop_spec));
        }
        let mut routes = BTreeMap::new();
        for i in 0..spec.num_routes() {
            let route_spec = spec.route(i);
            let mut route = Route::new();
            for j in 0..route_spec.num_hops() {
                route.add_hop(Hop::parse(route_spec.hop(j)));
            }
            routes.insert(route_spec.name().to_string(), route);
        }
        Self { name: spec.protocol().to_string(), hops, routes }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn has_hops(&self) -> bool {
        !self.hops.is_empty()
    }

    #[must_use]
    pub fn num_hops(&self) -> usize {
        self.hops.len()
    }

    #[must_use]
    pub fn has_hop(&self, name: &str) -> bool {
        self.hops.contains_key(name)
    }

    #[must_use]
    pub fn hop(&self, name: &str) -> Option<&HopBlueprint> {
        self.hops.get(name)
    }

    /// Iterates the hops of this table in name order.
    pub fn hops(&self) -> impl Iterator<Item = (&str, &HopBlueprint)> {
        self.hops.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn has_routes(&self) -> bool {
        !self.routes.is_empty()
    }

    #[must_use]
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn has_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    #[must_use]
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    /// Iterates the routes of this table in name order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{HopSpec, RouteSpec};

    fn sample() -> RoutingTableSpec {
        RoutingTableSpec::new("document")
            .add_hop(HopSpec::new("indexing", "[Content]").add_recipient("search/0"))
            .add_hop(HopSpec::new("backup", "search/1"))
            .add_route(RouteSpec::new("default").add_hop("indexing").add_hop("backup"))
    }

    #[test]
    fn compiles_named_hops_and_routes() {
        let table = RoutingTable::new(&sample());
        assert!(table.has_hop("indexing"));
        assert!(table.has_hop("backup"));
        assert!(!table.has_hop("missing"));
        assert_eq!(table.num_hops(), 2);
        let route = table.route("default").expect("route present");
        assert_eq!(route.num_hops(), 2);
        assert_eq!(route.hop(0).service_name(), "indexing");
    }

    #[test]
    fn hops_iterate_in_name_order() {
        let table = RoutingTable::new(&sample());
        let names: Vec<&str> = table.hops().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["backup", "indexing"]);
    }

    #[test]
    fn unknown_route_is_none() {
        let table = RoutingTable::new(&sample());
        assert!(table.route("nonexistent").is_none());
    }
}
