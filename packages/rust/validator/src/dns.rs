//! MX record resolution for email domains.
//!
//! Every lookup is a live query: the resolver cache is disabled so a domain
//! that repeats across rows is queried again for each row.

use std::future::Future;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tracing::debug;

/// Answers whether a mail domain publishes at least one MX record.
pub trait MxResolver {
    /// `true` if `domain` has an MX record. Resolution failures and timeouts
    /// are reported as `false`, the same as an empty answer.
    fn has_mx(&self, domain: &str) -> impl Future<Output = bool>;
}

/// [`MxResolver`] backed by the system DNS configuration.
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
}

impl DnsMxResolver {
    /// Build a resolver from `/etc/resolv.conf` (or the platform equivalent),
    /// falling back to the library's default upstreams when that can't be read.
    pub fn from_system() -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                debug!(error = %e, "system resolver config unavailable, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl MxResolver for DnsMxResolver {
    async fn has_mx(&self, domain: &str) -> bool {
        debug!(domain, "looking up MX records");
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let count = lookup.iter().count();
                debug!(domain, count, "MX lookup returned records");
                count > 0
            }
            Err(e) => {
                debug!(domain, error = %e, "MX lookup failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for DnsMxResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsMxResolver").finish_non_exhaustive()
    }
}
