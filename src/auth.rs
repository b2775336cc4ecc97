//! Bearer token verification against Supabase Auth.
//!
//! Sessions are Supabase's business; this service only asks Supabase who a
//! token belongs to and then loads the matching `users` row.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::SupabaseConfig,
    error::{AppError, Result},
    model::user::User,
    state::AppState,
};

/// Identity proven by a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthIdentity>;
}

pub struct SupabaseAuth {
    http: Client,
    user_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            user_url: format!("{}/auth/v1/user", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
        })
    }
}

#[async_trait]
impl TokenVerifier for SupabaseAuth {
    async fn verify(&self, token: &str) -> Result<AuthIdentity> {
        let response = self
            .http
            .get(&self.user_url)
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<AuthIdentity>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AppError::Unauthorized("Sessione non valida o scaduta".into()))
            }
            status => Err(AppError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Autenticazione richiesta".into()))
}

pub async fn find_user(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, user_type, full_name, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

fn state_from(parts: &Parts) -> Result<AppState> {
    parts
        .extensions
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| AppError::Internal("Application state missing from request".into()))
}

/// A verified token, whether or not the user has been synced yet.
pub struct AuthUser(pub AuthIdentity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let token = bearer_token(&parts.headers)?.to_string();
        let state = state_from(parts)?;
        let identity = state.auth.verify(&token).await?;
        debug!(user_id = %identity.id, "Token verified");
        Ok(AuthUser(identity))
    }
}

/// A verified token whose user row exists.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        let app = state_from(parts)?;
        let user = find_user(&app.pool, identity.id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Utente non registrato. Completa la registrazione.".into()))?;
        Ok(CurrentUser(user))
    }
}
