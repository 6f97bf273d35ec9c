//! Reference to URL expansion.

/// Expand a script reference into the URL to fetch.
///
/// Anything starting with `http` is used as-is. Otherwise the reference is an
/// opaque short code and becomes `<raw_host>/raw/<reference>`.
pub fn resolve_reference(reference: &str, raw_host: &str) -> String {
    let reference = reference.trim();
    if reference.starts_with("http") {
        return reference.to_string();
    }
    let host = raw_host.trim_end_matches('/');
    format!("{host}/raw/{reference}")
}
