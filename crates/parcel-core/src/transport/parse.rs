//! Parse HTTP response header lines.

use super::RemoteMetadata;
use crate::checksum::normalize_md5_hex;

/// Value of the first header named `name` (case-insensitive).
pub(crate) fn header_value<'a>(lines: &'a [String], name: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        if n.trim().eq_ignore_ascii_case(name) {
            Some(v.trim())
        } else {
            None
        }
    })
}

/// Status code from the `HTTP/x y reason` line.
pub(crate) fn parse_status(lines: &[String]) -> Option<u32> {
    let status_line = lines.iter().find(|l| l.starts_with("HTTP/"))?;
    status_line.split_whitespace().nth(1)?.parse().ok()
}

/// `bytes a-b/total` → `(a, b)` (inclusive end).
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let span = rest.split('/').next()?;
    let (a, b) = span.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Collect size, Content-Disposition and md5 from HEAD response headers.
pub(crate) fn parse_metadata(lines: &[String]) -> RemoteMetadata {
    RemoteMetadata {
        size: header_value(lines, "content-length").and_then(|v| v.parse::<u64>().ok()),
        content_disposition: header_value(lines, "content-disposition").map(str::to_string),
        content_md5: header_value(lines, "content-md5").and_then(normalize_md5_hex),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn metadata_from_headers() {
        let l = lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "content-disposition: attachment; filename=\"x/y/report.bam\"",
            "Content-MD5: 0F343B0931126A20F133D67C2B018A3B",
        ]);
        let m = parse_metadata(&l);
        assert_eq!(m.size, Some(12345));
        assert!(m.content_disposition.unwrap().contains("report.bam"));
        assert_eq!(m.content_md5.as_deref(), Some("0f343b0931126a20f133d67c2b018a3b"));
    }

    #[test]
    fn metadata_missing_fields() {
        let m = parse_metadata(&lines(&["HTTP/1.1 200 OK", "Content-Length: nope"]));
        assert_eq!(m.size, None);
        assert_eq!(m.content_disposition, None);
        assert_eq!(m.content_md5, None);
    }

    #[test]
    fn status_line() {
        assert_eq!(parse_status(&lines(&["HTTP/1.1 206 Partial Content"])), Some(206));
        assert_eq!(parse_status(&lines(&["HTTP/2 404"])), Some(404));
        assert_eq!(parse_status(&lines(&["Content-Length: 1"])), None);
    }

    #[test]
    fn content_range() {
        assert_eq!(parse_content_range("bytes 0-99/1000"), Some((0, 99)));
        assert_eq!(parse_content_range("bytes 500-999/*"), Some((500, 999)));
        assert_eq!(parse_content_range("bytes */1000"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }
}
