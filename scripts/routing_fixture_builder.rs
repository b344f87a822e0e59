//! Deterministic routing-table config-string fixture builder.
//!
//! Emits the same handful of scenarios integration tests and manual
//! exploration need, so nobody hand-writes `routingtable[N]...` config
//! strings by eye.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use routing_table::{HopSpec, RouteSpec, RoutingSpec, RoutingTableSpec};

#[derive(Debug, Clone, ValueEnum)]
enum Scenario {
    /// A named route expanding through one level of indirection.
    NamedRoute,
    /// A single hop fanning out across recipients via a load-balancing policy.
    LoadBalance,
    /// A hop whose failures are swallowed rather than propagated.
    IgnoreResult,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Deterministic routing-table fixture builder")]
struct Args {
    /// Scenario to emit
    #[arg(long)]
    scenario: Scenario,

    /// File to write the config string to; stdout if omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn run(args: Args) -> Result<()> {
    let spec = match args.scenario {
        Scenario::NamedRoute => named_route_spec(),
        Scenario::LoadBalance => load_balance_spec(),
        Scenario::IgnoreResult => ignore_result_spec(),
    };
    let config = spec.to_config_string();

    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            fs::write(&path, config).with_context(|| format!("writing {}", path.display()))
        }
        None => io::stdout()
            .lock()
            .write_all(config.as_bytes())
            .context("writing fixture to stdout"),
    }
}

fn named_route_spec() -> RoutingSpec {
    RoutingSpec::new().add_table(
        RoutingTableSpec::new("test")
            .add_route(RouteSpec::new("default").add_hop("route:inner").add_hop("search/0"))
            .add_route(RouteSpec::new("inner").add_hop("search/1")),
    )
}

fn load_balance_spec() -> RoutingSpec {
    RoutingSpec::new().add_table(
        RoutingTableSpec::new("test").add_hop(
            HopSpec::new("lb", "[RoundRobin]").add_recipient("search/0").add_recipient("search/1"),
        ),
    )
}

fn ignore_result_spec() -> RoutingSpec {
    RoutingSpec::new().add_table(
        RoutingTableSpec::new("test")
            .add_hop(HopSpec::new("best-effort", "search/0").set_ignore_result(true)),
    )
}

fn main() {
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
