use dashmap::DashMap;
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Sentinel recorded on a click when the lookup failed or the address can
/// never be geolocated.
pub const NOT_RECOGNIZED: &str = "not recognized";

/// Thread-safe in-memory cache: IP string → Option<country name>.
/// `None` means we already tried and the lookup failed/returned no data.
#[derive(Clone, Debug)]
pub struct GeoCache {
    inner: Arc<DashMap<String, Option<String>>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

impl Default for GeoCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── ip-api.com response shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
}

// ── Public API ─────────────────────────────────────────────────────────────

/// Look up the country name for `ip`, using `cache` to avoid repeated
/// network requests for the same address.
///
/// Returns `None` for:
/// - private / loopback / link-local addresses
/// - failed or rate-limited API responses
/// - IPs that previously returned no useful data
///
/// The lookup is performed with a 3-second timeout so it can never stall a
/// redirect for long; callers record [`NOT_RECOGNIZED`] on `None`.
pub async fn lookup(ip: &str, api_base: &str, cache: &GeoCache) -> Option<String> {
    // Skip addresses that can never be geolocated
    if is_private(ip) {
        return None;
    }

    // Check cache first (covers both successful hits and known misses)
    if let Some(entry) = cache.inner.get(ip) {
        return entry.clone();
    }

    let result = fetch_country(ip, api_base).await;

    // Store in cache regardless of outcome so we don't retry endlessly
    cache.inner.insert(ip.to_owned(), result.clone());

    result
}

// ── Internal helpers ───────────────────────────────────────────────────────

async fn fetch_country(ip: &str, api_base: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .ok()?;

    let url = format!("{api_base}/{ip}?fields=status,country");

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| tracing::debug!("geo lookup network error for {}: {}", ip, e))
        .ok()?;

    let body: IpApiResponse = resp
        .json()
        .await
        .map_err(|e| tracing::debug!("geo lookup parse error for {}: {}", ip, e))
        .ok()?;

    if body.status != "success" {
        tracing::debug!("geo lookup returned non-success status for {}", ip);
        return None;
    }

    body.country.filter(|s| !s.is_empty())
}

/// Return `true` for addresses that should never be sent to a public
/// geolocation API: loopback, link-local, private ranges, and IPv6 special
/// addresses.
fn is_private(ip_str: &str) -> bool {
    // Strip IPv6-mapped IPv4 prefix: "::ffff:1.2.3.4" → "1.2.3.4"
    let ip_str = ip_str.strip_prefix("::ffff:").unwrap_or(ip_str);

    match IpAddr::from_str(ip_str) {
        Ok(IpAddr::V4(addr)) => {
            let octets = addr.octets();
            addr.is_loopback()          // 127.x.x.x
            || addr.is_link_local()     // 169.254.x.x
            || addr.is_unspecified()    // 0.0.0.0
            || addr.is_broadcast()
            // 10.x.x.x
            || octets[0] == 10
            // 172.16.x.x – 172.31.x.x
            || (octets[0] == 172 && (16..=31).contains(&octets[1]))
            // 192.168.x.x
            || (octets[0] == 192 && octets[1] == 168)
        }
        Ok(IpAddr::V6(addr)) => {
            addr.is_loopback()       // ::1
            || addr.is_unspecified() // ::
            // fe80::/10  link-local
            || (addr.segments()[0] & 0xffc0) == 0xfe80
            // fc00::/7   unique-local
            || (addr.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => true, // unparseable → treat as private / skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_skipped() {
        assert!(is_private("127.0.0.1"));
        assert!(is_private("10.0.0.5"));
        assert!(is_private("172.20.1.1"));
        assert!(is_private("192.168.1.1"));
        assert!(is_private("::1"));
        assert!(is_private("::ffff:192.168.0.1"));
        assert!(is_private("garbage"));
    }

    #[test]
    fn public_addresses_are_not_skipped() {
        assert!(!is_private("8.8.8.8"));
        assert!(!is_private("::ffff:8.8.8.8"));
        assert!(!is_private("2001:4860:4860::8888"));
    }

    #[tokio::test]
    async fn private_address_lookup_is_none_without_network() {
        let cache = GeoCache::new();
        // never hits the network, so an unroutable api_base is fine
        assert!(lookup("127.0.0.1", "http://127.0.0.1:1", &cache).await.is_none());
    }
}
