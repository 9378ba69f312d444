//! Content-Disposition header parsing (filename and filename*).

/// Extracts the attachment filename from a raw Content-Disposition value.
///
/// Supports `filename="value"`, `filename='value'`, `filename=value` and
/// RFC 5987 `filename*=UTF-8''percent-encoded` (which takes precedence).
/// Repositories often put an object-store key in the filename
/// (`bucket/prefix/name.bam`); only the last path segment is returned.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.trim().split(';') {
        let Some((name, v)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let v = v.trim();

        if name == "filename*" {
            let encoded = v
                .get(..7)
                .filter(|p| p.eq_ignore_ascii_case("utf-8''"))
                .map(|_| &v[7..]);
            if let Some(rest) = encoded {
                let decoded = basename(&percent_decode(rest));
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if name == "filename" {
            let unquoted = strip_quotes(v);
            let base = basename(&unescape(unquoted));
            if !base.is_empty() {
                plain = Some(base);
            }
        }
    }

    plain
}

fn strip_quotes(v: &str) -> &str {
    let v = v.trim_matches('"');
    v.trim_matches('\'')
}

fn basename(name: &str) -> String {
    name.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Undo backslash escapes of `"` and `\` inside a quoted value.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(&next)) if next == '"' || next == '\\' => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
