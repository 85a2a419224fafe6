//! Endpoint resolution.
//!
//! Every backend resolves its externally reachable host in the same order:
//! an operator-configured override wins, otherwise the backend computes a
//! default (usually `<bucket>.<vendor host>`). Resolution happens once, at
//! construction.

/// Resolve the endpoint from an optional override and a backend default.
///
/// Blank overrides are ignored. The result is a host without scheme; a
/// trailing `/` is trimmed from either value, except from a bare `/`.
pub fn resolve_endpoint(configured: Option<&str>, default: impl FnOnce() -> String) -> String {
    match configured.map(str::trim).filter(|value| !value.is_empty()) {
        Some(endpoint) => tidy(endpoint),
        None => tidy(&default()),
    }
}

fn tidy(endpoint: &str) -> String {
    match strip_scheme(endpoint).trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Drop a leading `http://` or `https://`.
pub fn strip_scheme(host: &str) -> &str {
    ["https://", "http://"]
        .iter()
        .find_map(|scheme| host.strip_prefix(scheme))
        .unwrap_or(host)
}

/// Virtual-hosted style host for a bucket: `<bucket>.<host>`.
pub fn bucket_host(bucket: &str, host: &str) -> String {
    format!("{}.{}", bucket, strip_scheme(host).trim_end_matches('/'))
}
