use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::{
    dto::RegistrationRequest,
    services::{register_participant, RegistrationError},
};
use crate::{state::AppState, store::UserRecord};

pub fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/registrations", post(register))
        .route("/users/:id", get(get_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<(StatusCode, HeaderMap, Json<UserRecord>), (StatusCode, String)> {
    let user = match register_participant(
        state.store.as_ref(),
        state.clock.as_ref(),
        &state.config,
        payload,
    )
    .await
    {
        Ok(u) => u,
        Err(e @ (RegistrationError::MissingName | RegistrationError::AgreementRequired)) => {
            warn!(error = %e, "registration rejected");
            return Err((StatusCode::BAD_REQUEST, e.to_string()));
        }
        Err(RegistrationError::Store(e)) => {
            error!(error = %e, "registration failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/users/{}", user.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, (StatusCode, String)> {
    match state.store.find_user(id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "User not found".into())),
        Err(e) => {
            error!(error = %e, %id, "find_user failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
