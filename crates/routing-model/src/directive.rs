//! The atomic unit of a [`crate::Hop`]'s selector.
//!
//! Five closed variants, matching the routing primitives a hop can be built
//! from: a literal name-service match, a reference to a named route, a
//! routing-policy invocation, a direct host/port/session address, and an
//! immediate error. Represented as an enum rather than a trait-object
//! hierarchy, since the set of variants is closed and `matches` is a simple
//! per-variant equality check.

use std::fmt;

/// One primitive in a hop's selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Matched literally by the name service.
    Verbatim(String),
    /// Expands to a named route from the routing table.
    Route(String),
    /// Identifies a routing policy plus its opaque configuration string.
    Policy { name: String, param: String },
    /// Bypasses the name service and connects directly.
    Tcp { host: String, port: u32, session: String },
    /// Short-circuits resolution with an immediate error reply.
    Error(String),
}

impl Directive {
    /// Returns whether this directive matches another. `Policy` matches any
    /// other `Policy` by design, so that a stored hop can match a runtime
    /// -evaluated one; `Error` never matches anything, including itself.
    #[must_use]
    pub fn matches(&self, other: &Directive) -> bool {
        match (self, other) {
            (Directive::Verbatim(a), Directive::Verbatim(b)) => a == b,
            (Directive::Route(a), Directive::Route(b)) => a == b,
            (Directive::Policy { .. }, Directive::Policy { .. }) => true,
            (Directive::Tcp { host: h1, port: p1, session: s1 },
             Directive::Tcp { host: h2, port: p2, session: s2 }) => h1 == h2 && p1 == p2 && s1 == s2,
            _ => false,
        }
    }

    /// Returns a debug representation; never meant to be re-parsed.
    #[must_use]
    pub fn to_debug_string(&self) -> String {
        match self {
            Directive::Verbatim(image) => format!("VerbatimDirective(image = '{image}')"),
            Directive::Route(name) => format!("RouteDirective(name = '{name}')"),
            Directive::Policy { name, param } => {
                format!("PolicyDirective(name = '{name}', param = '{param}')")
            }
            Directive::Tcp { host, port, session } => {
                format!("TcpDirective(host = '{host}', port = {port}, session = '{session}')")
            }
            Directive::Error(msg) => format!("ErrorDirective(msg = '{msg}')"),
        }
    }
}

impl fmt::Display for Directive {
    /// Round-trippable through [`crate::parse_hop`], except for `Error`,
    /// whose parenthesized form is deliberately not re-parseable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Verbatim(image) => write!(f, "{image}"),
            Directive::Route(name) => write!(f, "route:{name}"),
            Directive::Policy { name, param } => {
                if param.is_empty() {
                    write!(f, "[{name}]")
                } else {
                    write!(f, "[{name}:{param}]")
                }
            }
            Directive::Tcp { host, port, session } => write!(f, "tcp/{host}:{port}/{session}"),
            Directive::Error(msg) => write!(f, "({msg})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_matches_any_policy() {
        let a = Directive::Policy { name: "RoundRobin".into(), param: String::new() };
        let b = Directive::Policy { name: "Other".into(), param: "p".into() };
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn error_never_matches() {
        let a = Directive::Error("boom".into());
        assert!(!a.matches(&a.clone()));
    }

    #[test]
    fn verbatim_compares_image() {
        let a = Directive::Verbatim("search/0".into());
        let b = Directive::Verbatim("search/1".into());
        assert!(!a.matches(&b));
        assert!(a.matches(&Directive::Verbatim("search/0".into())));
    }

    #[test]
    fn tcp_compares_triple() {
        let a = Directive::Tcp { host: "h".into(), port: 1, session: "s".into() };
        let b = Directive::Tcp { host: "h".into(), port: 2, session: "s".into() };
        assert!(!a.matches(&b));
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(Directive::Verbatim("search/0".into()).to_string(), "search/0");
        assert_eq!(Directive::Route("default".into()).to_string(), "route:default");
        assert_eq!(
            Directive::Policy { name: "RoundRobin".into(), param: String::new() }.to_string(),
            "[RoundRobin]"
        );
        assert_eq!(
            Directive::Policy { name: "Content".into(), param: "p".into() }.to_string(),
            "[Content:p]"
        );
        assert_eq!(
            Directive::Tcp { host: "h".into(), port: 80, session: "s".into() }.to_string(),
            "tcp/h:80/s"
        );
        assert_eq!(Directive::Error("bad".into()).to_string(), "(bad)");
    }
}
