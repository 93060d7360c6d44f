use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_STAFF: &str = "STAFF";

/// Back-office operator. STAFF is scoped to one bus company; ADMIN sees all.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StaffClaims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    pub exp: usize,
}

impl StaffClaims {
    pub fn new(sub: impl Into<String>, role: &str, company_id: Option<Uuid>, ttl_seconds: u64) -> Self {
        Self {
            sub: sub.into(),
            role: role.to_string(),
            company_id,
            exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn ensure_company(&self, company_id: Uuid) -> Result<(), AppError> {
        if self.is_admin() || self.company_id == Some(company_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{} may not manage company {}", self.sub, company_id)))
        }
    }
}

pub fn encode_token(claims: &StaffClaims, secret: &str) -> Result<String, AppError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}

pub async fn staff_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let token_data = decode::<StaffClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let claims = token_data.claims;
    match claims.role.as_str() {
        ROLE_ADMIN => {}
        ROLE_STAFF if claims.company_id.is_some() => {}
        ROLE_STAFF => return Err(AppError::Forbidden("Staff token carries no company".to_string())),
        other => return Err(AppError::Forbidden(format!("Role {} may not use the back office", other))),
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_is_scoped_to_company() {
        let company = Uuid::new_v4();
        let staff = StaffClaims::new("clerk", ROLE_STAFF, Some(company), 60);

        assert!(staff.ensure_company(company).is_ok());
        assert!(matches!(staff.ensure_company(Uuid::new_v4()), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_admin_is_unrestricted() {
        let admin = StaffClaims::new("root", ROLE_ADMIN, None, 60);
        assert!(admin.ensure_company(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_token_round_trip() {
        let claims = StaffClaims::new("clerk", ROLE_STAFF, Some(Uuid::new_v4()), 60);
        let token = encode_token(&claims, "secret").unwrap();

        let decoded = decode::<StaffClaims>(
            &token,
            &DecodingKey::from_secret("secret".as_bytes()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.company_id, claims.company_id);
    }
}
