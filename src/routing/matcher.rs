//! Request classification primitives.
//!
//! # Design Decisions
//! - Suffix matching is case-sensitive and looks at the path only
//! - Query parameters are percent-decoded; an empty value counts as absent

use axum::http::Uri;

/// True if `path` ends with any of `suffixes`.
pub fn has_any_suffix(path: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| path.ends_with(suffix))
}

/// First non-empty value of query parameter `name`.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes() {
        assert!(has_any_suffix("/live/a.flv", &[".flv", ".ts"]));
        assert!(!has_any_suffix("/live/a.FLV", &[".flv"]));
        assert!(!has_any_suffix("/live/a.flv/index", &[".flv"]));
    }

    #[test]
    fn query_values() {
        let uri: Uri = "/live/a.m3u8?shp_uuid=abc%2D1&shp_xpsid=&x=1".parse().unwrap();
        assert_eq!(query_param(&uri, "shp_uuid").as_deref(), Some("abc-1"));
        assert_eq!(query_param(&uri, "shp_xpsid"), None);
        assert_eq!(query_param(&uri, "missing"), None);

        let bare: Uri = "/live/a.m3u8".parse().unwrap();
        assert_eq!(query_param(&bare, "shp_uuid"), None);
    }
}
