//! Endpoint parsing for the receiving side (`host[:port]`)

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal.
pub fn parse_endpoint(s: &str, default_port: u16) -> Result<Endpoint> {
    let s = s.trim();
    if s.is_empty() {
        bail!("a sender must be specified");
    }

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let Some((host, after)) = rest.split_once(']') else {
            bail!("unterminated IPv6 address in {:?}", s);
        };
        match after {
            "" => (host, None),
            _ => match after.strip_prefix(':') {
                Some(p) => (host, Some(p)),
                None => bail!("unexpected text after IPv6 address in {:?}", s),
            },
        }
    } else if s.matches(':').count() > 1 {
        // bare IPv6 literal, no port
        (s, None)
    } else {
        match s.split_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (s, None),
        }
    };

    if host.is_empty() {
        bail!("missing host in {:?}", s);
    }
    let port = match port {
        Some(p) => match p.parse::<u16>() {
            Ok(n) if n > 0 => n,
            _ => bail!("invalid port {:?} in {:?}", p, s),
        },
        None => default_port,
    };

    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}
