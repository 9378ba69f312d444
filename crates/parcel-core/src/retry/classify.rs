//! Classify HTTP status and curl errors into error kinds.

use super::policy::ErrorKind;

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        404 | 410 => ErrorKind::NotFound,
        401 | 403 => ErrorKind::Forbidden,
        408 | 429 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error. Timeouts and connection-level failures are transient.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout()
        || e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
        || e.is_ssl_connect_error()
    {
        return ErrorKind::Transient;
    }
    ErrorKind::Other
}
