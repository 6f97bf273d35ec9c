//! Splitting fetched or stored bodies into command lines.

/// Split `body` into trimmed, non-empty command lines in original order.
///
/// `\n`, `\r\n` and a lone `\r` all terminate a line.
pub fn parse_lines(body: &str) -> Vec<String> {
    body.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Canonical stored form of a captured script: surviving lines joined by a
/// single `\n`, no trailing newline. `None` when nothing survives.
pub fn canonical_body(body: &str) -> Option<String> {
    let lines = parse_lines(body);
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}
