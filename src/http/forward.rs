//! Reverse-proxy forwarding primitive.
//!
//! # Responsibilities
//! - Build outbound clients with the configured dial shape
//! - Rewrite the request target to `http://127.0.0.1:<port>`
//! - Relay the backend response, streaming the body

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{uri::PathAndQuery, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::UpstreamConfig;
use crate::http::headers::{apply_forwarded, strip_hop_by_hop};
use crate::resilience::backend_addr;

pub type UpstreamClient = Client<HttpConnector, Body>;

/// A client with its own connection pool.
pub fn build_client(upstream: &UpstreamConfig) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(upstream.connect_timeout_secs)));
    connector.set_keepalive(Some(Duration::from_secs(upstream.keepalive_secs)));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new()).build(connector)
}

/// `http://127.0.0.1:<port>` followed by the original path and query.
pub fn upstream_uri(port: u16, original: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = original
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");

    Uri::builder()
        .scheme("http")
        .authority(backend_addr(port).to_string())
        .path_and_query(path_and_query)
        .build()
}

/// Forward `request` to the backend on `port` through `client`.
///
/// Any failure to reach the backend becomes a 502.
pub async fn forward(
    client: &UpstreamClient,
    port: u16,
    peer: SocketAddr,
    request: Request<Body>,
) -> Response {
    let (mut parts, body) = request.into_parts();

    parts.uri = match upstream_uri(port, &parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot build upstream URI");
            return (StatusCode::BAD_REQUEST, "Bad request target").into_response();
        }
    };
    parts.version = Version::HTTP_11;
    apply_forwarded(&mut parts.headers, peer);

    let target = parts.uri.clone();
    match client.request(Request::from_parts(parts, body)).await {
        Ok(response) => relay_response(response),
        Err(e) => {
            tracing::warn!(upstream = %target, error = %e, "Upstream request failed");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

fn relay_response(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_authority_keeps_path_and_query() {
        let original: Uri = "/live/a.m3u8?shp_uuid=u1".parse().unwrap();
        let uri = upstream_uri(8081, &original).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:8081/live/a.m3u8?shp_uuid=u1");
    }

    #[test]
    fn absolute_form_is_rewritten() {
        let original: Uri = "http://cdn.example.com/live/a.flv".parse().unwrap();
        let uri = upstream_uri(9000, &original).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:9000/live/a.flv");
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let client = build_client(&UpstreamConfig::default());
        let request = Request::get("/live/a.flv").body(Body::empty()).unwrap();
        let response = forward(&client, port, "127.0.0.1:5000".parse().unwrap(), request).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
