use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use super::services::{generate_id_card, IdCard, IdCardError};
use crate::state::AppState;

pub fn id_card_routes() -> Router<AppState> {
    Router::new().route("/users/:id/id-card", post(create_id_card))
}

#[instrument(skip(state))]
pub async fn create_id_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IdCard>, (StatusCode, String)> {
    generate_id_card(state.store.as_ref(), state.clock.as_ref(), id)
        .await
        .map(Json)
        .map_err(|e| match e {
            IdCardError::UserNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
            IdCardError::Store(ref inner) => {
                error!(error = %inner, %id, "id card generation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        })
}
