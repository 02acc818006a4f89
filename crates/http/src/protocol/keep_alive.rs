//! Persistent connection negotiation.

use http::header::CONNECTION;
use http::{HeaderMap, Version};

/// Whether a message with these headers keeps its connection open.
///
/// An explicit `Connection: close` wins, then `Connection: keep-alive`.
/// Without either token HTTP/1.1 defaults to persistent connections and
/// older versions do not.
pub fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let mut requested = None;
    for value in headers.get_all(CONNECTION) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for token in value.split(',').map(str::trim) {
            if token.eq_ignore_ascii_case("close") {
                return false;
            }
            if token.eq_ignore_ascii_case("keep-alive") {
                requested = Some(true);
            }
        }
    }

    requested.unwrap_or(version == Version::HTTP_11)
}
