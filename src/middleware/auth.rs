use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::database::ProgressStore;
use crate::error::{Entity, Error, Result};
use crate::models::user::{ROLE_ADMIN, ROLE_MANAGER};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
    #[serde(default, rename = "bankId", skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<Uuid>,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .map_or(false, |r| r.eq_ignore_ascii_case(role))
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "success": false, "error": code }))).into_response()
}

fn decode_bearer(req: &Request) -> std::result::Result<Claims, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "bad_authorization"));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(reject(StatusCode::UNAUTHORIZED, "unsupported_scheme"));
    };

    let config = crate::config::get_config();
    decode_claims(token, &config.jwt_secret)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "invalid_token"))
}

/// Verifies an HS256 bearer token, expiry included.
pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .ok()
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    match decode_bearer(&req) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(response) => response,
    }
}

pub async fn require_admin(mut req: Request, next: Next) -> Response {
    match decode_bearer(&req) {
        Ok(claims) if claims.has_role(ROLE_ADMIN) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Ok(_) => reject(StatusCode::FORBIDDEN, "forbidden"),
        Err(response) => response,
    }
}

/// Progress is scoped to the learner: admins see everyone, managers the
/// users of their bank, learners only themselves.
pub async fn ensure_user_access(
    store: &dyn ProgressStore,
    claims: &Claims,
    user_id: Uuid,
) -> Result<()> {
    if claims.has_role(ROLE_ADMIN) || claims.user_id() == Some(user_id) {
        return Ok(());
    }
    if claims.has_role(ROLE_MANAGER) {
        let target = store
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound(Entity::User))?;
        if claims.bank_id.is_some() && target.bank_id == claims.bank_id {
            return Ok(());
        }
    }
    Err(Error::Forbidden(
        "Not allowed to access this user's progress".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryProgressStore;
    use crate::models::user::User;
    use chrono::Utc;

    fn claims(sub: Uuid, role: &str, bank_id: Option<Uuid>) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: usize::MAX,
            role: Some(role.to_string()),
            bank_id,
        }
    }

    #[tokio::test]
    async fn access_is_scoped_by_role() {
        let store = MemoryProgressStore::new();
        let bank = Uuid::new_v4();
        let learner = User {
            id: Uuid::new_v4(),
            email: "learner@bank.test".into(),
            name: "Learner".into(),
            role: "learner".into(),
            bank_id: Some(bank),
            is_active: true,
            created_at: Utc::now(),
        };
        store.insert_user(&learner).await.unwrap();

        let own = claims(learner.id, "learner", Some(bank));
        assert!(ensure_user_access(&store, &own, learner.id).await.is_ok());

        let other_learner = claims(Uuid::new_v4(), "learner", Some(bank));
        assert!(matches!(
            ensure_user_access(&store, &other_learner, learner.id).await,
            Err(Error::Forbidden(_))
        ));

        let same_bank_manager = claims(Uuid::new_v4(), "manager", Some(bank));
        assert!(ensure_user_access(&store, &same_bank_manager, learner.id).await.is_ok());

        let other_bank_manager = claims(Uuid::new_v4(), "manager", Some(Uuid::new_v4()));
        assert!(ensure_user_access(&store, &other_bank_manager, learner.id).await.is_err());

        let admin = claims(Uuid::new_v4(), "ADMIN", None);
        assert!(ensure_user_access(&store, &admin, learner.id).await.is_ok());
    }
}
