//! Peer allow-list for the sending side

use anyhow::{bail, Context, Result};
use std::net::IpAddr;

use crate::protocol::ANYONE;

/// Which peers a sender will hand data to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFilter {
    Anyone,
    Only(Vec<IpAddr>),
}

impl PeerFilter {
    /// Build a filter from a comma-separated list of addresses, host names,
    /// or the `anyone` token. Host names are resolved once, here.
    pub async fn resolve(spec: &str) -> Result<Self> {
        let entries: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            bail!("a recipient must be specified");
        }
        if entries.iter().any(|e| e.eq_ignore_ascii_case(ANYONE)) {
            return Ok(PeerFilter::Anyone);
        }

        let mut allowed = Vec::new();
        for entry in entries {
            match parse_literal(entry) {
                Some(ip) => allowed.push(ip),
                None => {
                    let resolved = tokio::net::lookup_host((entry, 0))
                        .await
                        .with_context(|| format!("resolve recipient {}", entry))?;
                    let before = allowed.len();
                    allowed.extend(resolved.map(|addr| addr.ip().to_canonical()));
                    if allowed.len() == before {
                        bail!("recipient {} did not resolve to any address", entry);
                    }
                }
            }
        }
        allowed.sort();
        allowed.dedup();
        Ok(PeerFilter::Only(allowed))
    }

    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        PeerFilter::Only(addrs.into_iter().map(|ip| ip.to_canonical()).collect())
    }

    pub fn allows(&self, peer: IpAddr) -> bool {
        match self {
            PeerFilter::Anyone => true,
            PeerFilter::Only(allowed) => allowed.contains(&peer.to_canonical()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PeerFilter::Anyone => ANYONE.to_string(),
            PeerFilter::Only(allowed) => allowed
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn parse_literal(entry: &str) -> Option<IpAddr> {
    let bare = entry
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(entry);
    bare.parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}
