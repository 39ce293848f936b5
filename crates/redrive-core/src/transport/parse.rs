//! Parse raw response header lines collected by curl.

use std::collections::BTreeMap;

/// Turn header lines into a lowercase-keyed map.
///
/// With redirects curl reports one header block per hop; only the last
/// block (the one after the final status line) is kept. Repeated headers
/// are joined with `", "`.
pub(crate) fn parse_header_lines(lines: &[String]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            headers
                .entry(name)
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_last_block_only() {
        let h = parse_header_lines(&lines(&[
            "HTTP/1.1 301 Moved Permanently",
            "Location: https://example.com/new",
            "",
            "HTTP/1.1 503 Service Unavailable",
            "Retry-After: 7",
            "",
        ]));
        assert_eq!(h.get("retry-after").map(String::as_str), Some("7"));
        assert!(!h.contains_key("location"));
    }

    #[test]
    fn joins_repeated_headers() {
        let h = parse_header_lines(&lines(&[
            "HTTP/1.1 200 OK",
            "Vary: Accept",
            "vary: Origin",
            "Content-Type: application/json; charset=utf-8",
        ]));
        assert_eq!(h.get("vary").map(String::as_str), Some("Accept, Origin"));
        assert_eq!(
            h.get("content-type").map(String::as_str),
            Some("application/json; charset=utf-8")
        );
    }
}
