//! Turning configured hosts into an ordered list of addresses to try.

use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use rand::Rng;
use rand::seq::SliceRandom;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use crate::db::Host;

/// One address to try, remembering the host name it came from for SNI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host: String,
    pub addr: SocketAddr,
    pub ssl: bool,
}

/// Resolves hosts off the I/O path.
pub struct Resolver {
    inner: TokioResolver,
}

impl Resolver {
    /// Use the system configuration, or the default one if it cannot be read.
    pub fn new() -> Self {
        let inner = TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            });
        Self { inner }
    }

    /// Resolve every host and order the results for connecting. Hosts that
    /// fail to resolve are logged and skipped.
    pub async fn resolve(&self, hosts: &[Host]) -> Vec<Candidate> {
        let mut found = Vec::new();
        for host in hosts {
            if let Ok(ip) = host.address.trim_matches(['[', ']']).parse::<IpAddr>() {
                found.push(Candidate {
                    host: host.address.clone(),
                    addr: SocketAddr::new(ip, host.port),
                    ssl: host.ssl,
                });
                continue;
            }

            match self.inner.lookup_ip(host.address.as_str()).await {
                Ok(lookup) => {
                    for ip in lookup.iter() {
                        found.push(Candidate {
                            host: host.address.clone(),
                            addr: SocketAddr::new(ip, host.port),
                            ssl: host.ssl,
                        });
                    }
                }
                Err(e) => warn!(host = %host.address, error = %e, "DNS lookup failed"),
            }
        }
        let ordered = order_candidates(found, &mut rand::thread_rng());
        debug!(count = ordered.len(), "Resolved upstream candidates");
        ordered
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicate, then put IPv6 first, shuffled within each family. IPv6
/// failures tend to surface quickly, so dual-stack hosts connect sooner.
pub fn order_candidates<R: Rng + ?Sized>(candidates: Vec<Candidate>, rng: &mut R) -> Vec<Candidate> {
    let mut v6 = Vec::new();
    let mut v4 = Vec::new();
    for c in candidates {
        if v6.contains(&c) || v4.contains(&c) {
            continue;
        }
        if c.addr.is_ipv6() {
            v6.push(c);
        } else {
            v4.push(c);
        }
    }
    v6.shuffle(rng);
    v4.shuffle(rng);
    v6.extend(v4);
    v6
}
