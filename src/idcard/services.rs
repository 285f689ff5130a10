use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    clock::Clock,
    store::{repo_types::normalize_identifier, Category, RecordStore, StoreError, UserUpdate},
};

/// Id printed on cards for records that never got a student id.
pub const FALLBACK_CARD_ID: &str = "TEMP-ID";

#[derive(Debug, thiserror::Error)]
pub enum IdCardError {
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the client needs to render and export a badge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdCard {
    pub user_id: Uuid,
    pub participant_name: String,
    pub generated_id: String,
    /// Text encoded in the badge's QR code; scans resolve it back to the user.
    pub qr_value: String,
    pub category: Option<Category>,
    pub category_color: Option<String>,
    /// Names of participants with declared medical conditions are set in italics.
    pub highlight_name: bool,
    pub download_name: String,
}

fn download_name(participant_name: &str) -> String {
    let name = participant_name.trim();
    let name = if name.is_empty() { "Participant" } else { name };
    format!("{name}_ID.png")
}

/// Stamps the user's scan identifier and returns the card payload.
///
/// Writes `generated_id_lowercase` together with `generated_id` so the
/// badge's QR text always resolves on scan.
#[instrument(skip(store, clock))]
pub async fn generate_id_card(
    store: &dyn RecordStore,
    clock: &dyn Clock,
    user_id: Uuid,
) -> Result<IdCard, IdCardError> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or(IdCardError::UserNotFound(user_id))?;

    let generated_id = user
        .student_id
        .clone()
        .unwrap_or_else(|| FALLBACK_CARD_ID.to_string());

    store
        .apply_update(
            user.id,
            UserUpdate::MarkIdGenerated {
                generated_id: generated_id.clone(),
                generated_id_lowercase: normalize_identifier(&generated_id),
                qr_value: generated_id.clone(),
                at: clock.now_utc(),
            },
        )
        .await?;

    info!(%user_id, %generated_id, "id card generated");
    Ok(IdCard {
        user_id: user.id,
        download_name: download_name(&user.participant_name),
        highlight_name: !user.profile.medical_conditions.is_empty(),
        participant_name: user.participant_name,
        qr_value: generated_id.clone(),
        generated_id,
        category: user.category,
        category_color: user.category_color,
    })
}
