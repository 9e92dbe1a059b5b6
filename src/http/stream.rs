//! Plain stream forwarding (FLV, plain HLS segments, audio, crossdomain).
//!
//! Every stream gets an isolated outbound client so one long-lived FLV pull
//! never shares a connection pool with another. `.xml` policy files are
//! short and use one shared client.

use std::net::SocketAddr;

use axum::{body::Body, http::Request, response::Response};

use crate::config::UpstreamConfig;
use crate::http::forward::{build_client, forward, UpstreamClient};

pub struct StreamProxy {
    shared: UpstreamClient,
    upstream: UpstreamConfig,
}

impl StreamProxy {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            shared: build_client(&upstream),
            upstream,
        }
    }

    pub async fn serve(
        &self,
        port: u16,
        peer: SocketAddr,
        shared_transport: bool,
        request: Request<Body>,
    ) -> Response {
        tracing::debug!(
            peer_addr = %peer,
            backend_port = port,
            path = %request.uri().path(),
            shared_transport,
            "Proxying stream request"
        );

        if shared_transport {
            forward(&self.shared, port, peer, request).await
        } else {
            let client = build_client(&self.upstream);
            forward(&client, port, peer, request).await
        }
    }
}
