//! Locator handling: scheme fixing and the item id in the URL path.

/// Prefixes `https://` when the locator has no http(s) scheme.
pub fn fix_uri(url: &str) -> String {
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Last non-empty path segment of the URL (the item id for `<server>/data/<id>`).
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Replaces the last path segment of `url` with `id` (used to address related
/// files next to a primary item).
pub fn sibling_url(url: &str, id: &str) -> Option<String> {
    let mut parsed = url::Url::parse(url).ok()?;
    {
        let mut segments = parsed.path_segments_mut().ok()?;
        segments.pop_if_empty().pop().push(id);
    }
    Some(parsed.to_string())
}

/// Locator for the compressed bundle of `ids` next to `url`
/// (`<server>/data/<id1>,<id2>?compress=true`).
pub fn annotations_url(url: &str, ids: &[String]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let mut parsed = url::Url::parse(&sibling_url(url, &ids.join(","))?).ok()?;
    parsed.set_query(Some("compress=true"));
    Some(parsed.to_string())
}
