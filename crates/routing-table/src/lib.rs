//! The routing configuration value-object tree (`HopSpec`/`RouteSpec`/
//! `RoutingTableSpec`/`RoutingSpec`) and the compiled [`RoutingTable`] built
//! from it.

mod blueprint;
mod spec;
mod table;

pub use blueprint::HopBlueprint;
pub use spec::{to_config_string, HopSpec, RouteSpec, RoutingSpec, RoutingTableSpec};
pub use table::RoutingTable;
