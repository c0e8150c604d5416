//! Admission gates applied at the HTTP boundary.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{ConvertError, Tier};
use crate::state::AppState;

const UNKNOWN_CLIENT: &str = "unknown";

/// Client identifier for rate limiting: the peer IP.
pub fn client_id(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

async fn gate(state: &AppState, tier: Tier, request: Request, next: Next) -> Response {
    let client = client_id(&request);
    if !state.admission.admit(tier, &client) {
        return ConvertError::AdmissionDenied(tier).into_response();
    }
    next.run(request).await
}

pub async fn api_admission(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    gate(&state, Tier::Api, request, next).await
}

pub async fn convert_admission(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    gate(&state, Tier::Convert, request, next).await
}
