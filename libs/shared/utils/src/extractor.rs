use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Bearer token of the current request, stored next to the `User` so
/// handlers can forward it to the store and keep row-level security intact.
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?
        .to_string();

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(AccessToken(token));

    Ok(next.run(request).await)
}

/// Resolves the clinic a staff member acts for. Any failure is reported as
/// the same generic auth error.
pub async fn resolve_staff_clinic(
    supabase: &SupabaseClient,
    user: &User,
    token: &str,
) -> Result<Uuid, AppError> {
    match supabase.get_staff_clinic_id(&user.id, token).await {
        Ok(Some(clinic_id)) => Ok(clinic_id),
        Ok(None) => {
            warn!("User {} is not attached to any clinic", user.id);
            Err(AppError::Auth("Clinic not found for current session".to_string()))
        }
        Err(e) => {
            warn!("Clinic lookup failed for user {}: {}", user.id, e);
            Err(AppError::Auth("Clinic not found for current session".to_string()))
        }
    }
}
