//! A list of [`Hop`]s resolved from first to last as a message moves from
//! source to destination.

use std::fmt;

use crate::hop::Hop;
use crate::parser;

/// A parsed or programmatically built route. May be rewritten at any time by
/// application logic or an invoked routing policy, so no guarantee on actual
/// path can be given without full knowledge of all such logic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    hops: Vec<Hop>,
}

impl Route {
    /// Constructs a route with no hops.
    #[must_use]
    pub fn new() -> Self {
        Self { hops: Vec::new() }
    }

    /// Constructs a route from an explicit hop list.
    #[must_use]
    pub fn from_hops(hops: Vec<Hop>) -> Self {
        Self { hops }
    }

    /// Parses a whitespace-separated list of hops. Never fails; a hop that
    /// fails to parse truncates the route to that single error hop.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        parser::parse_route(s)
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
    pub fn hop(&self, i: usize) -> &Hop {
        &self.hops[i]
    }

    pub fn hop_mut(&mut self, i: usize) -> &mut Hop {
        &mut self.hops[i]
    }

    pub fn add_hop(&mut self, hop: Hop) -> &mut Self {
        self.hops.push(hop);
        self
    }

    pub fn set_hop(&mut self, i: usize, hop: Hop) -> &mut Self {
        self.hops[i] = hop;
        self
    }

    pub fn remove_hop(&mut self, i: usize) -> Hop {
        self.hops.remove(i)
    }

    pub fn clear_hops(&mut self) -> &mut Self {
        self.hops.clear();
        self
    }

    #[must_use]
    pub fn to_debug_string(&self) -> String {
        let parts: Vec<String> = self.hops.iter().map(Hop::to_debug_string).collect();
        format!("Route(hops = {{ {} }})", parts.join(", "))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.hops.iter().map(Hop::to_string).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_route_has_no_hops() {
        let route = Route::new();
        assert!(!route.has_hops());
        assert_eq!(route.to_string(), "");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let route = Route::parse("search/0 route:default [RoundRobin]");
        assert_eq!(route.to_string(), "search/0 route:default [RoundRobin]");
    }

    #[test]
    fn set_and_remove_hop() {
        let mut route = Route::parse("a b c");
        route.set_hop(1, Hop::parse("z"));
        assert_eq!(route.to_string(), "a z c");
        let removed = route.remove_hop(0);
        assert_eq!(removed.to_string(), "a");
        assert_eq!(route.num_hops(), 2);
    }
}
