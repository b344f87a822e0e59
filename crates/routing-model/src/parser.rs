//! The route expression grammar.
//!
//! ```text
//! route   := hop ( whitespace+ hop )*
//! hop     := '?'? ( "tcp/" tcp_body | "route:" name | dir ( '/' dir )* )
//! dir     := '[' name (':' param)? ']' | verbatim
//! tcp_body:= host ':' port '/' session
//! ```
//!
//! Parsing never fails outright; syntax errors are carried as an
//! [`crate::Directive::Error`] directive on the resulting hop so that a
//! caller always gets a `Hop`/`Route` back.

use crate::directive::Directive;
use crate::hop::Hop;
use crate::route::Route;

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\x0c' | '\n' | '\r' | '\t')
}

/// Mimics `atoi`: parses the longest leading run of ASCII digits, 0 if none.
fn atoi_prefix(s: &str) -> u32 {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn create_tcp_directive(s: &str) -> Option<Directive> {
    let pos_p = s.find(':')?;
    if pos_p == 0 {
        return None; // no host
    }
    let rest = &s[pos_p..];
    let pos_s_rel = rest.find('/')?;
    let pos_s = pos_p + pos_s_rel;
    if pos_s == pos_p + 1 {
        return None; // no port
    }
    let host = s[..pos_p].to_string();
    let port = atoi_prefix(&s[pos_p + 1..pos_s]);
    let session = s[pos_s + 1..].to_string();
    Some(Directive::Tcp { host, port, session })
}

fn create_policy_directive(s: &str) -> Directive {
    match s.find(':') {
        None => Directive::Policy { name: s.to_string(), param: String::new() },
        Some(pos) => Directive::Policy {
            name: s[..pos].to_string(),
            param: s[pos + 1..].to_string(),
        },
    }
}

fn create_directive(s: &str) -> Directive {
    if s.len() > 2 && s.starts_with('[') {
        return create_policy_directive(&s[1..s.len() - 1]);
    }
    Directive::Verbatim(s.to_string())
}

/// Parses a single hop from its string representation.
#[must_use]
pub fn parse_hop(s: &str) -> Hop {
    if s.is_empty() {
        return Hop::new(vec![Directive::Error("Failed to parse empty string.".into())], false);
    }
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();

    if len > 1 && chars[0] == '?' {
        let rest: String = chars[1..].iter().collect();
        let mut hop = parse_hop(&rest);
        hop.set_ignore_result(true);
        return hop;
    }

    if len > 4 && s.starts_with("tcp/") {
        if let Some(tcp) = create_tcp_directive(&s[4..]) {
            return Hop::new(vec![tcp], false);
        }
    }

    if len > 6 && s.starts_with("route:") {
        return Hop::new(vec![Directive::Route(s[6..].to_string())], false);
    }

    let mut directives = Vec::new();
    let mut from = 0usize;
    let mut depth: i32 = 0;
    let mut at = 0usize;
    while at <= len {
        if at == len || (depth == 0 && chars[at] == '/') {
            if depth > 0 {
                return Hop::new(
                    vec![Directive::Error("Unexpected token '': syntax error".into())],
                    false,
                );
            }
            let segment: String = chars[from..at].iter().collect();
            directives.push(create_directive(&segment));
            from = at + 1;
        } else if is_whitespace(chars[at]) && depth == 0 {
            return Hop::new(
                vec![Directive::Error(format!("Failed to completely parse '{s}'."))],
                false,
            );
        } else if chars[at] == '[' {
            depth += 1;
        } else if chars[at] == ']' {
            if depth == 0 {
                return Hop::new(
                    vec![Directive::Error("Unexpected token ']': syntax error".into())],
                    false,
                );
            }
            depth -= 1;
        }
        at += 1;
    }
    Hop::new(directives, false)
}

/// Parses a whitespace-separated list of hops into a route.
#[must_use]
pub fn parse_route(s: &str) -> Route {
    let mut route = Route::new();
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();

    let mut from = 0usize;
    let mut depth: i32 = 0;
    let mut at = 0usize;
    while at <= len {
        if at == len || (depth == 0 && is_whitespace(chars[at])) {
            if from < at {
                let segment: String = chars[from..at].iter().collect();
                let hop = parse_hop(&segment);
                if hop.has_directives() && matches!(hop.directive(0), Some(Directive::Error(_))) {
                    return Route::from_hops(vec![hop]);
                }
                route.add_hop(hop);
            }
            from = at + 1;
        } else if chars[at] == '[' {
            depth += 1;
        } else if chars[at] == ']' && depth > 0 {
            depth -= 1;
        }
        at += 1;
    }
    route
}
