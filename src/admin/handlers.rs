use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use crate::admin::error::ApiError;
use crate::admin::version::{VersionInfo, HTTPLB_SIGNATURE, RTMPLB_SIGNATURE};
use crate::load_balancer::BackendSelector;

/// Which balancer the control API belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Rtmp,
    Http,
}

impl BackendKind {
    /// Query parameter of `/api/v1/proxy`.
    pub fn query_key(&self) -> &'static str {
        match self {
            BackendKind::Rtmp => "rtmp",
            BackendKind::Http => "http",
        }
    }

    pub fn signature(&self) -> &'static str {
        match self {
            BackendKind::Rtmp => RTMPLB_SIGNATURE,
            BackendKind::Http => HTTPLB_SIGNATURE,
        }
    }
}

#[derive(Clone)]
pub struct ControlState {
    pub selector: Arc<BackendSelector>,
    pub kind: BackendKind,
}

/// `{"code": 0, "data": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { code: 0, data })
    }
}

#[derive(Debug, Serialize)]
pub struct BackendsView {
    pub active: Option<u16>,
    pub ports: Vec<u16>,
}

pub async fn get_version() -> Json<ApiResponse<VersionInfo>> {
    ApiResponse::ok(VersionInfo::current())
}

/// `GET /api/v1/proxy?<kind>=<port>`: switch the active backend.
pub async fn set_proxy(
    State(state): State<ControlState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let key = state.kind.query_key();
    let value = query
        .get(key)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter(key))?;

    let invalid = |reason: String| ApiError::InvalidPort {
        key,
        value: value.clone(),
        reason,
    };
    let port = value.parse::<u16>().map_err(|e| invalid(e.to_string()))?;
    let previous = state
        .selector
        .set_active(port)
        .map_err(|e| invalid(e.to_string()))?;

    tracing::info!(
        kind = key,
        port,
        previous = ?previous,
        "Active backend switched"
    );
    Ok(ApiResponse::ok(()))
}

pub async fn get_backends(State(state): State<ControlState>) -> Json<ApiResponse<BackendsView>> {
    ApiResponse::ok(BackendsView {
        active: state.selector.active(),
        ports: state.selector.known_ports(),
    })
}
