//! Locator modeling and local naming.
//!
//! Derives the per-item directory from the locator path and the output
//! filename from the Content-Disposition header.

mod content_disposition;
mod path;
mod sanitize;

use std::time::{SystemTime, UNIX_EPOCH};

pub use content_disposition::parse_content_disposition_filename;
pub use path::{annotations_url, fix_uri, last_path_segment, sibling_url};
pub use sanitize::sanitize_filename;

/// Output name when the remote suggests none.
pub const DEFAULT_FILENAME: &str = "untitled";

/// Output filename for a download: the Content-Disposition filename reduced
/// to a sanitized basename, or `untitled`.
pub fn output_filename(content_disposition: Option<&str>) -> String {
    let sanitized = content_disposition
        .and_then(parse_content_disposition_filename)
        .map(|name| sanitize_filename(&name))
        .unwrap_or_default();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Name of the directory an item is downloaded into: the item id from the
/// locator path, or `parcel-<unix seconds>` for multi-id requests (ids joined
/// by `,`) and locators without a usable path.
pub fn item_directory_name(url: &str) -> String {
    match last_path_segment(url) {
        Some(id) if !id.contains(',') => sanitize_filename(&id),
        _ => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("parcel-{}", secs)
        }
    }
}
