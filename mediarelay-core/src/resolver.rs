use url::{ParseError, Url};

/// Returns the last non-empty path segment of `raw`, which doubles as the
/// proxy lookup key and the artifact file stem.
///
/// Links pasted without a scheme (`host/s/abc`) are read as a bare path.
/// Unparsable input and paths without segments yield `None`.
pub fn resolve_identifier(raw: &str) -> Option<String> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(parsed) => last_segment(parsed.path()),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let path = raw.split(['?', '#']).next().unwrap_or_default();
            last_segment(path)
        }
        Err(_) => None,
    }
}

fn last_segment(path: &str) -> Option<String> {
    path.trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Builds `<base>?id=<identifier>`, keeping any query the base already carries.
pub fn proxy_url(base: &Url, identifier: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("id", identifier);
    url
}
