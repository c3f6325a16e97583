//! End-to-end: admin bootstrap, warden pre-registration, login, serial
//! claim and approval, against an on-disk database.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::NaiveDate;
use fieldops_core::ManualClock;
use fieldops_core::config::Config;
use fieldops_server::assets::{ClaimSubmission, ReviewAction, SerialState, WardenPreRegistration};
use fieldops_server::storage::{FieldDatabase, SerialStatus};
use fieldops_server::{AssetService, AuthService, Directory, ErrorKind, ServiceError};

/// 2026-06-01T00:00:00Z
const T0: i64 = 1_780_272_000;

#[tokio::test]
async fn admin_and_warden_walk_a_machine_to_approval() {
    let dir = tempfile::tempdir().unwrap();
    let db = FieldDatabase::open(&dir.path().join("field.db"))
        .await
        .unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let config = Config::default();
    let auth = AuthService::new(db.clone(), clock.clone(), config.auth.clone());
    let assets = AssetService::new(db.clone(), clock.clone(), config.registry.clone());
    let directory = Directory::new(db.clone(), clock.clone());

    // Admin bootstraps and logs in.
    directory
        .bootstrap_admin("Asha Admin", "9999999999")
        .await
        .unwrap();
    let issued = auth.request_otp("9999999999", None).await.unwrap();
    let admin_session = auth.verify_otp("9999999999", &issued.code).await.unwrap();
    let admin_header = format!("Bearer {}", admin_session.token);
    let admin = auth.require_user(Some(&admin_header)).await.unwrap();

    // Unknown phones cannot log in.
    let err = auth.request_otp("1111111111", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotRegistered));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Warden is pre-registered with two placeholders.
    let outcome = assets
        .pre_register_warden(
            &admin,
            WardenPreRegistration {
                full_name: "Wanjiru Warden".into(),
                phone: "9876543210".into(),
                district_id: "district-7".into(),
                hostel_id: Some("hostel-3".into()),
                machine_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.assigned_temp_codes.len(), 2);
    assert!(outcome.assigned_temp_codes[0].starts_with("TMP-3210-"));

    // Warden logs in, fumbling the first attempt.
    let issued = auth.request_otp("9876543210", None).await.unwrap();
    let wrong = if issued.code == "000000" { "000001" } else { "000000" };
    let err = auth.verify_otp("9876543210", wrong).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCode { attempts: 1 }));

    let warden_session = auth.verify_otp("9876543210", &issued.code).await.unwrap();
    let warden_header = format!("Bearer {}", warden_session.token);
    let warden = auth
        .authenticate(Some(&warden_header))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(warden.id, outcome.warden.id);

    let (attempts,): (i64,) =
        sqlx::query_as("SELECT attempts FROM otp_codes WHERE phone = '9876543210'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(attempts, 1);

    // Warden claims a serial for the first placeholder.
    let install_date = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
    let pending = assets
        .submit_claim(
            &warden,
            ClaimSubmission {
                temp_code: &outcome.assigned_temp_codes[0],
                claimed_serial: "SN-2026-0001",
                install_date,
                notes: None,
                hostel_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.serial_status(), Some(SerialStatus::Pending));

    let queue = assets.list_pending_claims(&admin).await.unwrap();
    assert_eq!(queue.len(), 1);

    // Admin approves without overriding the serial.
    clock.advance(3600);
    let approved = assets
        .review_claim(
            &admin,
            &pending.id,
            ReviewAction::Approve {
                approved_serial: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(SerialState::of(&approved), SerialState::Approved);
    assert_eq!(approved.serial_number.as_deref(), Some("SN-2026-0001"));
    assert_eq!(approved.installation_date, Some(install_date));
    assert_eq!(
        approved.warranty_end,
        NaiveDate::from_ymd_opt(2027, 5, 10)
    );
    assert_eq!(approved.warranty_status.as_deref(), Some("ACTIVE"));
    assert_eq!(approved.warranty_claimed_by.as_deref(), Some(warden.id.as_str()));

    // The warden sees both machines, newest first, one of them approved.
    let machines = assets.list_assigned_machines(&warden).await.unwrap();
    assert_eq!(machines.len(), 2);
    assert_eq!(
        machines
            .iter()
            .filter(|m| SerialState::of(m) == SerialState::Approved)
            .count(),
        1
    );

    // Sessions run out after thirty days.
    clock.set(warden_session.expires_at);
    assert!(auth.authenticate(Some(&warden_header)).await.unwrap().is_none());
}

#[tokio::test]
async fn database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("field.db");

    {
        let db = FieldDatabase::open(&path).await.unwrap();
        let directory = Directory::new(db, Arc::new(ManualClock::new(T0)));
        directory
            .bootstrap_admin("Asha Admin", "9999999999")
            .await
            .unwrap();
    }

    let db = FieldDatabase::open(&path).await.unwrap();
    let admin = db.get_user_by_phone("9999999999").await.unwrap();
    assert!(admin.is_some());
}
