// auth-service-rs/src/middleware.rs
//
// Authentication middleware for axum services
// Applies an `AuthGate` to every request: rejected requests get a 401 JSON
// body, authenticated ones carry their `Claims` in the request extensions.
//
//     let app = Router::new()
//         .route("/task", post(handle_task))
//         .layer(axum::middleware::from_fn_with_state(gate, require_identity));

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::gate::{AuthGate, GateDecision};

// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub code: u16,
}

/// Gate every request through `gate`
pub async fn require_identity(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request,
    next: Next,
) -> Response {
    // A header that is not valid UTF-8 is present but malformed
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default().to_string());

    let path = req.uri().path().to_string();

    match gate.authorize(&path, authorization.as_deref()).await {
        GateDecision::Public | GateDecision::Anonymous => next.run(req).await,
        GateDecision::Authenticated(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        GateDecision::Rejected(reason) => (
            StatusCode::UNAUTHORIZED,
            Json(AuthErrorResponse {
                error: reason,
                code: StatusCode::UNAUTHORIZED.as_u16(),
            }),
        )
            .into_response(),
    }
}
