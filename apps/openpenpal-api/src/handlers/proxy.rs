//! Reverse-proxy surface for configured upstream services. Selection,
//! retry, and health marking live in `openpenpal-gateway`; this handler
//! only translates between axum and the pipeline's request shape.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use openpenpal_errors::DomainError;
use openpenpal_gateway::ProxyRequest;

use crate::auth::AuthUser;
use crate::state::AppState;

pub async fn forward(
    State(state): State<AppState>,
    user: AuthUser,
    Path((service, rest)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, DomainError> {
    // The routing key pins a user's requests to one instance under
    // consistent hashing; other algorithms ignore it.
    let key = user.user_id.to_string();

    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| DomainError::Internal("unsupported method".to_string()))?;

    let mut upstream_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream_headers.insert(name, value);
        }
    }

    let response = state
        .pipeline
        .dispatch(
            &service,
            Some(&key),
            ProxyRequest {
                method: upstream_method,
                path: format!("/{rest}"),
                headers: upstream_headers,
                body: body.to_vec(),
            },
        )
        .await
        .map_err(DomainError::from)?;

    let status = StatusCode::from_u16(response.status)
        .map_err(|_| DomainError::Internal("bad upstream status".to_string()))?;
    Ok((status, response.body).into_response())
}
