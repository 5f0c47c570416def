/// Tracking query parameters stripped during canonicalization (merge
/// rule 2). Kept as a fixed list rather than a heuristic — a URL that
/// differs only in these params is the same source.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
];

/// Normalizes a source URL for dedup comparison: lowercases the host,
/// strips a trailing slash from the path, and drops tracking query
/// params. No attempt is made to be a general-purpose URL normalizer —
/// this only needs to make two URLs that a human would call "the same
/// page" compare equal.
pub fn canonicalize(url: &str) -> String {
    let (scheme_and_rest, fragment_stripped) = match url.split_once('#') {
        Some((head, _)) => (head, true),
        None => (url, false),
    };
    let _ = fragment_stripped;

    let (authority_part, path_and_query) = match scheme_and_rest.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, scheme_and_rest),
    };

    let (host, path_and_query) = match path_and_query.split_once('/') {
        Some((host, rest)) => (host, format!("/{rest}")),
        None => (path_and_query, String::new()),
    };
    let host = host.to_ascii_lowercase();

    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query.as_str(), None),
    };
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    let query = query.map(filter_tracking_params).filter(|q| !q.is_empty());

    let mut out = String::new();
    if let Some(scheme) = authority_part {
        out.push_str(&scheme.to_ascii_lowercase());
        out.push_str("://");
    }
    out.push_str(&host);
    out.push_str(path);
    if let Some(query) = query {
        out.push('?');
        out.push_str(&query);
    }
    out
}

fn filter_tracking_params(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            !TRACKING_PARAMS.contains(&key)
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_and_strips_trailing_slash() {
        assert_eq!(
            canonicalize("https://Example.COM/pricing/"),
            "https://example.com/pricing"
        );
    }

    #[test]
    fn drops_tracking_params_but_keeps_real_ones() {
        let canon = canonicalize("https://example.com/blog?utm_source=hn&id=42&gclid=abc");
        assert_eq!(canon, "https://example.com/blog?id=42");
    }

    #[test]
    fn equivalent_urls_canonicalize_equal() {
        let a = canonicalize("https://Example.com/pricing/?utm_campaign=spring");
        let b = canonicalize("https://example.com/pricing");
        assert_eq!(a, b);
    }
}
