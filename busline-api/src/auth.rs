use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::auth::{encode_token, StaffClaims};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/refresh", post(refresh_token))
}

/// POST /auth/refresh
/// Re-issues the caller's token with a fresh expiry.
async fn refresh_token(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
) -> Result<Json<ApiResponse<TokenResponse>>, AppError> {
    let renewed = StaffClaims::new(claims.sub, &claims.role, claims.company_id, state.auth.expiration);
    let token = encode_token(&renewed, &state.auth.secret)?;

    Ok(ok(TokenResponse { token, expires_in: state.auth.expiration }))
}
