use crate::assets::{ClaimSubmission, DEFAULT_REJECTION_REASON, ReviewAction, SerialState};
use crate::error::ServiceError;
use crate::storage::{Machine, Role, SerialStatus, User};
use crate::test_helpers::{TestEnv, WARDEN_PHONE, date};

struct Fixture {
    env: TestEnv,
    admin: User,
    warden: User,
    codes: Vec<String>,
}

async fn fixture(count: u32) -> Fixture {
    let env = TestEnv::new().await;
    let admin = env.admin().await;
    let outcome = env
        .warden_with_placeholders(&admin, WARDEN_PHONE, count)
        .await;
    Fixture {
        env,
        admin,
        warden: outcome.warden,
        codes: outcome.assigned_temp_codes,
    }
}

fn claim<'a>(temp_code: &'a str, serial: &'a str) -> ClaimSubmission<'a> {
    ClaimSubmission {
        temp_code,
        claimed_serial: serial,
        install_date: date("2026-05-20"),
        notes: Some("fitted in block B"),
        hostel_id: None,
    }
}

impl Fixture {
    async fn submit(&self, index: usize, serial: &str) -> Machine {
        self.env
            .assets
            .submit_claim(&self.warden, claim(&self.codes[index], serial))
            .await
            .unwrap()
    }

    async fn approve(&self, machine_id: &str) -> Result<Machine, ServiceError> {
        self.env
            .assets
            .review_claim(
                &self.admin,
                machine_id,
                ReviewAction::Approve {
                    approved_serial: None,
                },
            )
            .await
    }

    async fn reject(&self, machine_id: &str, reason: Option<&str>) -> Result<Machine, ServiceError> {
        self.env
            .assets
            .review_claim(
                &self.admin,
                machine_id,
                ReviewAction::Reject {
                    reason: reason.map(str::to_string),
                },
            )
            .await
    }
}

#[tokio::test]
async fn claim_moves_machine_to_pending() {
    let f = fixture(1).await;
    let machine = f.submit(0, " SN-100 ").await;

    assert_eq!(SerialState::of(&machine), SerialState::Pending);
    assert_eq!(machine.claimed_serial.as_deref(), Some("SN-100"));
    assert_eq!(machine.claimed_install_date, Some(date("2026-05-20")));
    assert_eq!(machine.claim_notes.as_deref(), Some("fitted in block B"));
    assert!(machine.claimed_at.is_some());
    assert!(machine.serial_number.is_none());
    assert!(machine.warranty_start.is_none());
}

#[tokio::test]
async fn claim_can_update_hostel() {
    let f = fixture(1).await;
    let machine = f
        .env
        .assets
        .submit_claim(
            &f.warden,
            ClaimSubmission {
                hostel_id: Some("h9"),
                ..claim(&f.codes[0], "SN-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(machine.hostel_id.as_deref(), Some("h9"));
}

#[tokio::test]
async fn claim_checks_caller_and_machine() {
    let f = fixture(1).await;

    let err = f
        .env
        .assets
        .submit_claim(&f.warden, claim("TMP-0000-000000-1", "SN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let other = f.env.user("w2", "9000000003", Role::Warden).await;
    let err = f
        .env
        .assets
        .submit_claim(&other, claim(&f.codes[0], "SN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = f
        .env
        .assets
        .submit_claim(&f.admin, claim(&f.codes[0], "SN-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn claim_validates_input() {
    let f = fixture(1).await;

    let err = f
        .env
        .assets
        .submit_claim(&f.warden, claim(&f.codes[0], "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = f
        .env
        .assets
        .submit_claim(
            &f.warden,
            ClaimSubmission {
                install_date: date("2026-06-02"),
                ..claim(&f.codes[0], "SN-1")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn reject_then_reclaim_then_approve() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-100").await;

    let rejected = f.reject(&pending.id, None).await.unwrap();
    assert_eq!(rejected.serial_status(), Some(SerialStatus::Rejected));
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some(DEFAULT_REJECTION_REASON)
    );
    assert_eq!(rejected.reviewed_by.as_deref(), Some(f.admin.id.as_str()));
    assert_eq!(rejected.claimed_serial.as_deref(), Some("SN-100"));

    let reclaimed = f.submit(0, "SN-101").await;
    assert_eq!(reclaimed.serial_status(), Some(SerialStatus::Pending));
    assert!(reclaimed.rejection_reason.is_none());

    let approved = f.approve(&pending.id).await.unwrap();
    assert_eq!(approved.serial_status(), Some(SerialStatus::Approved));
    assert_eq!(approved.serial_number.as_deref(), Some("SN-101"));
    assert_eq!(approved.installation_date, Some(date("2026-05-20")));
    assert_eq!(approved.warranty_start, Some(date("2026-05-20")));
    assert_eq!(approved.warranty_end, Some(date("2027-05-20")));
    assert_eq!(approved.warranty_status.as_deref(), Some("ACTIVE"));
    assert_eq!(
        approved.warranty_claimed_by.as_deref(),
        Some(f.warden.id.as_str())
    );
    assert!(approved.rejection_reason.is_none());
}

#[tokio::test]
async fn custom_rejection_reason_is_kept() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-100").await;
    let rejected = f
        .reject(&pending.id, Some("Label unreadable"))
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Label unreadable"));
}

#[tokio::test]
async fn approval_can_override_serial() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-10O").await;

    let approved = f
        .env
        .assets
        .review_claim(
            &f.admin,
            &pending.id,
            ReviewAction::Approve {
                approved_serial: Some("SN-100".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.serial_number.as_deref(), Some("SN-100"));
    assert_eq!(approved.claimed_serial.as_deref(), Some("SN-10O"));
}

#[tokio::test]
async fn approval_needs_serial_and_install_date() {
    let f = fixture(1).await;
    let unclaimed = f
        .env
        .db
        .get_machine_by_temp_code(&f.codes[0])
        .await
        .unwrap()
        .unwrap();

    let err = f.approve(&unclaimed.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NoSerialAvailable));

    let err = f
        .env
        .assets
        .review_claim(
            &f.admin,
            &unclaimed.id,
            ReviewAction::Approve {
                approved_serial: Some("SN-1".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingInstallDate));
}

#[tokio::test]
async fn approved_machine_is_final() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-100").await;
    f.approve(&pending.id).await.unwrap();

    let err = f
        .env
        .assets
        .submit_claim(&f.warden, claim(&f.codes[0], "SN-200"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyApproved));

    let err = f.approve(&pending.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyApproved));
    let err = f.reject(&pending.id, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyApproved));

    let machine = f.env.db.get_machine(&pending.id).await.unwrap();
    assert_eq!(machine.serial_number.as_deref(), Some("SN-100"));
}

#[tokio::test]
async fn review_requires_admin_and_existing_machine() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-100").await;

    let err = f
        .env
        .assets
        .review_claim(
            &f.warden,
            &pending.id,
            ReviewAction::Reject { reason: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = f.approve("missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn approving_a_taken_serial_conflicts() {
    let f = fixture(2).await;
    let first = f.submit(0, "SN-100").await;
    let second = f.submit(1, "SN-100").await;
    f.approve(&first.id).await.unwrap();

    let err = f.approve(&second.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::SerialConflict(ref s) if s == "SN-100"));
    assert!(err.is_recoverable());

    let untouched = f.env.db.get_machine(&second.id).await.unwrap();
    assert_eq!(untouched.serial_status(), Some(SerialStatus::Pending));
    assert!(untouched.serial_number.is_none());
}

#[tokio::test]
async fn concurrent_approvals_of_one_serial_yield_one_conflict() {
    let f = fixture(2).await;
    let first = f.submit(0, "SN-777").await;
    let second = f.submit(1, "SN-777").await;

    let (a, b) = tokio::join!(f.approve(&first.id), f.approve(&second.id));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ServiceError::SerialConflict(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn old_install_date_gives_expired_warranty() {
    let f = fixture(1).await;
    let pending = f
        .env
        .assets
        .submit_claim(
            &f.warden,
            ClaimSubmission {
                install_date: date("2025-01-01"),
                ..claim(&f.codes[0], "SN-OLD")
            },
        )
        .await
        .unwrap();

    let approved = f.approve(&pending.id).await.unwrap();
    assert_eq!(approved.warranty_end, Some(date("2026-01-01")));
    assert_eq!(approved.warranty_status.as_deref(), Some("EXPIRED"));
}

#[tokio::test]
async fn manual_warranty_redates_approved_machine() {
    let f = fixture(1).await;
    let pending = f.submit(0, "SN-100").await;
    f.approve(&pending.id).await.unwrap();
    f.env.clock.advance(86_400);

    let updated = f
        .env
        .assets
        .manual_warranty_claim(&f.warden, "SN-100", date("2026-05-01"), Some("h2"))
        .await
        .unwrap();
    assert_eq!(updated.installation_date, Some(date("2026-05-01")));
    assert_eq!(updated.warranty_start, Some(date("2026-05-01")));
    assert_eq!(updated.warranty_end, Some(date("2027-05-01")));
    assert_eq!(updated.hostel_id.as_deref(), Some("h2"));
    assert_eq!(
        updated.warranty_claimed_by.as_deref(),
        Some(f.warden.id.as_str())
    );
    assert_eq!(updated.warranty_claimed_at, Some(f.env.now()));
    assert_eq!(updated.serial_number.as_deref(), Some("SN-100"));
}

#[tokio::test]
async fn manual_warranty_guards() {
    let f = fixture(2).await;
    let pending = f.submit(0, "SN-100").await;

    let err = f
        .env
        .assets
        .manual_warranty_claim(&f.warden, "SN-404", date("2026-05-01"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // A serial on a machine that was never approved.
    sqlx::query("UPDATE machines SET serial_number = 'SN-RAW' WHERE id = ?")
        .bind(&pending.id)
        .execute(f.env.db.pool())
        .await
        .unwrap();
    let err = f
        .env
        .assets
        .manual_warranty_claim(&f.warden, "SN-RAW", date("2026-05-01"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotYetApproved));

    let other = f.env.user("w2", "9000000003", Role::Warden).await;
    let second = f.submit(1, "SN-200").await;
    f.approve(&second.id).await.unwrap();
    let err = f
        .env
        .assets
        .manual_warranty_claim(&other, "SN-200", date("2026-05-01"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn pending_claims_are_listed_oldest_first() {
    let f = fixture(3).await;
    let a = f.submit(2, "SN-A").await;
    f.env.clock.advance(10);
    let b = f.submit(0, "SN-B").await;
    f.env.clock.advance(10);
    let c = f.submit(1, "SN-C").await;
    f.reject(&b.id, None).await.unwrap();

    let queue = f.env.assets.list_pending_claims(&f.admin).await.unwrap();
    let ids: Vec<&str> = queue.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), c.id.as_str()]);

    let err = f
        .env
        .assets
        .list_pending_claims(&f.warden)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}
