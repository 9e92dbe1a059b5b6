//! URL-suffix dispatch for the HTTP balancer.
//!
//! # Responsibilities
//! - Send playlists and HLS+ segments to the affinity proxy
//! - Send other media to plain stream forwarding
//! - Return an explicit no-match for everything else

use axum::http::Uri;

use crate::routing::matcher::{has_any_suffix, query_param};

/// Query parameter carrying the HLS+ viewer uuid.
pub const SHP_UUID: &str = "shp_uuid";

const STREAM_SUFFIXES: &[&str] = &[".flv", ".ts", ".aac", ".mp3", ".xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Session-affine forwarding.
    HlsPlus,
    /// Undistinguished forwarding. `shared_transport` is set for `.xml`.
    Stream { shared_transport: bool },
}

impl Route {
    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Route::HlsPlus => "hls_plus",
            Route::Stream { .. } => "stream",
        }
    }
}

/// Classify a request URI; `None` means the balancer does not serve it.
pub fn classify(uri: &Uri) -> Option<Route> {
    let path = uri.path();

    if path.ends_with(".m3u8") {
        return Some(Route::HlsPlus);
    }
    if path.ends_with(".ts") && query_param(uri, SHP_UUID).is_some() {
        return Some(Route::HlsPlus);
    }
    if has_any_suffix(path, STREAM_SUFFIXES) {
        return Some(Route::Stream {
            shared_transport: path.ends_with(".xml"),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(uri: &str) -> Option<Route> {
        classify(&uri.parse().unwrap())
    }

    #[test]
    fn playlists_are_always_hls_plus() {
        assert_eq!(route("/live/livestream.m3u8"), Some(Route::HlsPlus));
        assert_eq!(route("/live/livestream.m3u8?shp_uuid=u1"), Some(Route::HlsPlus));
    }

    #[test]
    fn segments_need_a_uuid() {
        assert_eq!(route("/live/livestream-1.ts?shp_uuid=u1"), Some(Route::HlsPlus));
        assert_eq!(
            route("/live/livestream-1.ts"),
            Some(Route::Stream { shared_transport: false })
        );
        assert_eq!(
            route("/live/livestream-1.ts?shp_uuid="),
            Some(Route::Stream { shared_transport: false })
        );
    }

    #[test]
    fn stream_suffixes() {
        for uri in ["/live/a.flv", "/live/a.aac", "/live/a.mp3"] {
            assert_eq!(route(uri), Some(Route::Stream { shared_transport: false }), "{uri}");
        }
        assert_eq!(route("/crossdomain.xml"), Some(Route::Stream { shared_transport: true }));
    }

    #[test]
    fn unknown_suffixes_are_not_served() {
        assert_eq!(route("/"), None);
        assert_eq!(route("/index.html"), None);
        assert_eq!(route("/live/a.mp4"), None);
    }
}
