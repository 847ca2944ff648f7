//! Endpoint resolver deriving a TCP probe target from a config link

use crate::proxy::models::{ConnectionRecord, ProbeTarget};
use url::{Host, Url};

/// Resolves config links to probe targets
pub struct EndpointResolver;

impl EndpointResolver {
    /// Derive the `(host, port)` a record points at.
    ///
    /// `None` means the record cannot be probed: an opaque scheme, a link that
    /// does not parse, an empty host, or a missing or zero port. It never means
    /// the endpoint is dead.
    pub fn resolve(record: &ConnectionRecord) -> Option<ProbeTarget> {
        if record.scheme().is_opaque() {
            return None;
        }
        Self::resolve_link(record.as_str())
    }

    /// Resolve a raw link without scheme checks
    pub fn resolve_link(link: &str) -> Option<ProbeTarget> {
        let url = Url::parse(link).ok()?;

        let host = match url.host()? {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        if host.is_empty() {
            return None;
        }

        match url.port() {
            Some(port) if port > 0 => Some(ProbeTarget::new(host, port)),
            _ => None,
        }
    }
}
