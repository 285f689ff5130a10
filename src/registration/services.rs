use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument};

use super::{
    category::{age_on, category_for_age},
    dto::RegistrationRequest,
};
use crate::{
    clock::Clock,
    config::AppConfig,
    store::{NewUser, RecordStore, StoreError, UserRecord},
};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("participant name is required")]
    MissingName,
    #[error("parent agreement is required")]
    AgreementRequired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Next sequential student id after `last`, e.g. `STU-007` -> `STU-008`.
///
/// The suffix is the run of leading digits once the prefix is removed; a
/// missing or unparseable id counts as 0. Padding is a minimum of three
/// digits, so `STU-999` is followed by `STU-1000`.
pub fn next_student_id(prefix: &str, last: Option<&str>) -> String {
    lazy_static! {
        static ref LEADING_DIGITS: Regex = Regex::new(r"^\s*(\d+)").expect("valid regex");
    }
    let last_number = last
        .map(|id| id.replacen(prefix, "", 1))
        .and_then(|rest| {
            LEADING_DIGITS
                .captures(&rest)
                .and_then(|c| c[1].parse::<u64>().ok())
        })
        .unwrap_or(0);
    format!("{prefix}{:03}", last_number + 1)
}

/// Creates the user record for a registration.
///
/// Allocation reads the newest record and writes the incremented id without
/// any lock, so two concurrent registrations can receive the same id.
#[instrument(skip(store, clock, config, req), fields(participant = %req.participant_name))]
pub async fn register_participant(
    store: &dyn RecordStore,
    clock: &dyn Clock,
    config: &AppConfig,
    req: RegistrationRequest,
) -> Result<UserRecord, RegistrationError> {
    let participant_name = req.participant_name.trim().to_string();
    if participant_name.is_empty() {
        return Err(RegistrationError::MissingName);
    }
    if !req.parent_agreement {
        return Err(RegistrationError::AgreementRequired);
    }

    let now = clock.now_utc();
    let age = age_on(req.dob, now.to_offset(config.utc_offset).date());
    let category = category_for_age(age);

    let last = store.latest_user().await?;
    let student_id = next_student_id(
        &config.student_id_prefix,
        last.as_ref().and_then(|u| u.student_id.as_deref()),
    );

    let user = store
        .insert_user(NewUser {
            student_id,
            participant_name,
            dob: req.dob,
            age,
            category,
            profile: req.profile(),
            created_at: now,
        })
        .await?;

    info!(user_id = %user.id, student_id = ?user.student_id, category = ?user.category, "participant registered");
    Ok(user)
}

#[cfg(test)]
mod registration_tests {
    use std::sync::Arc;

    use super::*;
    use crate::{clock::FixedClock, state::AppState, store::{memory::MemoryRecordStore, Category}};
    use rstest::rstest;
    use time::macros::{date, datetime};

    fn request(name: &str, dob: time::Date) -> RegistrationRequest {
        RegistrationRequest {
            participant_name: name.into(),
            dob,
            father_name: "JOSEPH".into(),
            mother_name: "MARY".into(),
            contact_home: String::new(),
            contact_father_office: String::new(),
            contact_father_mobile: "0557339724".into(),
            contact_mother_office: String::new(),
            contact_mother_mobile: String::new(),
            email: "parent@example.com".into(),
            residence: "Karama".into(),
            parent_agreement: true,
            parent_signature: "J".into(),
            medical_conditions: vec!["Asthma".into()],
            other_condition: String::new(),
            medical_notes: "N/A".into(),
        }
    }

    #[rstest]
    #[case(None, "STU-001")]
    #[case(Some("STU-007"), "STU-008")]
    #[case(Some("STU-099"), "STU-100")]
    #[case(Some("STU-999"), "STU-1000")]
    #[case(Some("STU-12abc"), "STU-013")]
    #[case(Some("garbage"), "STU-001")]
    fn allocates_next_sequential_id(#[case] last: Option<&str>, #[case] expected: &str) {
        assert_eq!(next_student_id("STU-", last), expected);
    }

    #[tokio::test]
    async fn registration_derives_category_and_sequence() {
        let store = Arc::new(MemoryRecordStore::new());
        let clock = FixedClock::new(datetime!(2025-12-20 10:00 UTC));
        let config = AppState::fake_config();

        let first = register_participant(&*store, &clock, &config, request("ANNA", date!(2015-03-01)))
            .await
            .unwrap();
        clock.set(datetime!(2025-12-20 10:05 UTC));
        let second = register_participant(&*store, &clock, &config, request("BEN", date!(2010-01-15)))
            .await
            .unwrap();

        assert_eq!(first.student_id.as_deref(), Some("STU-001"));
        assert_eq!(first.age, Some(10));
        assert_eq!(first.category, Some(Category::Junior));
        assert_eq!(first.category_color.as_deref(), Some("red"));
        assert_eq!(second.student_id.as_deref(), Some("STU-002"));
        assert_eq!(second.category, Some(Category::Senior));
        assert_eq!(second.profile.medical_conditions, vec!["Asthma".to_string()]);
    }

    #[tokio::test]
    async fn out_of_band_age_has_no_category() {
        let store = MemoryRecordStore::new();
        let clock = FixedClock::new(datetime!(2025-12-20 10:00 UTC));
        let user = register_participant(
            &store,
            &clock,
            &AppState::fake_config(),
            request("CARL", date!(2000-05-05)),
        )
        .await
        .unwrap();
        assert_eq!(user.age, Some(25));
        assert_eq!(user.category, None);
        assert_eq!(user.category_color, None);
    }

    #[tokio::test]
    async fn blank_name_and_missing_agreement_are_rejected() {
        let store = MemoryRecordStore::new();
        let clock = FixedClock::new(datetime!(2025-12-20 10:00 UTC));
        let config = AppState::fake_config();

        let err = register_participant(&store, &clock, &config, request("   ", date!(2015-03-01)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingName));

        let mut no_consent = request("ANNA", date!(2015-03-01));
        no_consent.parent_agreement = false;
        let err = register_participant(&store, &clock, &config, no_consent)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AgreementRequired));
        assert_eq!(store.mutations(), 0);
    }

    // Read-increment-write is not atomic: two registrations that both read
    // the same newest record receive the same id.
    #[tokio::test]
    async fn concurrent_registrations_can_receive_the_same_id() {
        let store = MemoryRecordStore::new();
        let clock = FixedClock::new(datetime!(2025-12-20 10:00 UTC));
        let config = AppState::fake_config();
        register_participant(&store, &clock, &config, request("ANNA", date!(2015-03-01)))
            .await
            .unwrap();

        store.hold_reads(2);
        let (ben, carl) = tokio::join!(
            register_participant(&store, &clock, &config, request("BEN", date!(2014-02-02))),
            register_participant(&store, &clock, &config, request("CARL", date!(2013-03-03))),
        );

        assert_eq!(ben.unwrap().student_id.as_deref(), Some("STU-002"));
        assert_eq!(carl.unwrap().student_id.as_deref(), Some("STU-002"));
        assert_eq!(store.list_users().await.unwrap().len(), 3);
    }
}
