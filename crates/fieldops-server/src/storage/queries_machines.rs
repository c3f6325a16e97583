//! Machine registry and serial verification queries.
//!
//! Every transition update is guarded in its `WHERE` clause so a concurrent
//! transition on the same machine shows up as zero affected rows (`None`)
//! rather than a silent overwrite.

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::db::{DatabaseError, FieldDatabase};
use super::models::{Machine, RoleChange, SerialStatus, User, WarrantyStatus};
use super::queries::{UserParams, upsert_user};

/// One placeholder machine in a pre-registration batch.
#[derive(Debug, Clone, Copy)]
struct PlaceholderParams<'a> {
    id: &'a str,
    temp_code: &'a str,
    warden_id: &'a str,
    district_id: &'a str,
    hostel_id: Option<&'a str>,
    uploaded_by: &'a str,
}

/// Machines handed to a warden during pre-registration.
#[derive(Debug, Clone, Copy)]
pub enum WardenMachines<'a> {
    /// Existing machine IDs to assign.
    Assign(&'a [String]),
    /// `(id, temp_code)` pairs for new placeholders. District and hostel
    /// come from the warden.
    Placeholders(&'a [(String, String)]),
}

/// A warden's serial claim.
#[derive(Debug, Clone, Copy)]
pub struct ClaimParams<'a> {
    pub machine_id: &'a str,
    pub warden_id: &'a str,
    pub claimed_serial: &'a str,
    pub install_date: NaiveDate,
    pub notes: Option<&'a str>,
    pub hostel_id: Option<&'a str>,
}

/// Everything written when an admin approves a claim.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalParams<'a> {
    pub machine_id: &'a str,
    pub serial_number: &'a str,
    pub reviewer_id: &'a str,
    pub installation_date: NaiveDate,
    pub warranty_start: NaiveDate,
    pub warranty_end: NaiveDate,
    pub warranty_status: WarrantyStatus,
    pub warranty_claimed_by: Option<&'a str>,
}

/// A warden refreshing the warranty window of an approved machine.
#[derive(Debug, Clone, Copy)]
pub struct WarrantyParams<'a> {
    pub machine_id: &'a str,
    pub warden_id: &'a str,
    pub installation_date: NaiveDate,
    pub warranty_start: NaiveDate,
    pub warranty_end: NaiveDate,
    pub warranty_status: WarrantyStatus,
    pub hostel_id: Option<&'a str>,
}

const APPROVED: &str = SerialStatus::Approved.as_str();

impl FieldDatabase {
    // =========================================================================
    // Registry queries
    // =========================================================================

    /// Upsert a warden and hand them machines in one transaction.
    ///
    /// Any failure, including a temp-code `UniqueViolation`, leaves the
    /// user, the role audit and the machines untouched.
    pub async fn pre_register_warden(
        &self,
        warden: &UserParams<'_>,
        machines: WardenMachines<'_>,
        changed_by: &str,
        reason: &str,
        now: i64,
    ) -> Result<(User, Option<RoleChange>), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let (user, role_change) = upsert_user(&mut tx, warden, changed_by, reason, now).await?;

        match machines {
            WardenMachines::Assign(ids) => {
                assign_to_warden(&mut tx, ids, &user.id, warden.hostel_id, now).await?;
            }
            WardenMachines::Placeholders(slots) => {
                let district_id = warden.district_id.unwrap_or_default();
                for (id, temp_code) in slots {
                    let params = PlaceholderParams {
                        id,
                        temp_code,
                        warden_id: &user.id,
                        district_id,
                        hostel_id: warden.hostel_id,
                        uploaded_by: changed_by,
                    };
                    insert_placeholder(&mut tx, &params, now).await?;
                }
            }
        }

        tx.commit().await?;

        Ok((user, role_change))
    }

    /// Create machines whose serials are already known and verified.
    ///
    /// `machines` holds `(id, serial_number)` pairs. They start unassigned
    /// with serial status `APPROVED` and no warranty window.
    pub async fn create_serial_machines(
        &self,
        machines: &[(String, String)],
        district_id: Option<&str>,
        uploaded_by: &str,
        now: i64,
    ) -> Result<Vec<Machine>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        for (id, serial) in machines {
            sqlx::query(
                r"
                INSERT INTO machines
                    (id, serial_number, district_id, uploaded_by, serial_status,
                     reviewed_by, reviewed_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(id)
            .bind(serial)
            .bind(district_id)
            .bind(uploaded_by)
            .bind(APPROVED)
            .bind(uploaded_by)
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let mut created = Vec::with_capacity(machines.len());
        for (id, _) in machines {
            let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            created.push(machine);
        }

        tx.commit().await?;

        Ok(created)
    }

    /// Get a machine by ID.
    pub async fn get_machine(&self, id: &str) -> Result<Machine, DatabaseError> {
        sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Machine {id}")))
    }

    /// Get a machine by its temporary code.
    pub async fn get_machine_by_temp_code(
        &self,
        temp_code: &str,
    ) -> Result<Option<Machine>, DatabaseError> {
        let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE temp_code = ?")
            .bind(temp_code)
            .fetch_optional(self.pool())
            .await?;

        Ok(machine)
    }

    /// Get a machine by its canonical serial number.
    pub async fn get_machine_by_serial(
        &self,
        serial_number: &str,
    ) -> Result<Option<Machine>, DatabaseError> {
        let machine =
            sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE serial_number = ?")
                .bind(serial_number)
                .fetch_optional(self.pool())
                .await?;

        Ok(machine)
    }

    /// Machines whose canonical serial is in `serials`.
    pub async fn find_machines_by_serials(
        &self,
        serials: &[String],
    ) -> Result<Vec<Machine>, DatabaseError> {
        if serials.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM machines WHERE serial_number IN (");
        let mut list = qb.separated(", ");
        for serial in serials {
            list.push_bind(serial);
        }
        list.push_unseparated(")");

        let machines = qb
            .build_query_as::<Machine>()
            .fetch_all(self.pool())
            .await?;

        Ok(machines)
    }

    /// Machines assigned to a warden, newest first.
    pub async fn list_machines_for_warden(
        &self,
        warden_id: &str,
    ) -> Result<Vec<Machine>, DatabaseError> {
        let machines = sqlx::query_as::<_, Machine>(
            "SELECT * FROM machines WHERE warden_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(warden_id)
        .fetch_all(self.pool())
        .await?;

        Ok(machines)
    }

    /// Claims awaiting review, oldest claim first.
    pub async fn list_pending_claims(&self) -> Result<Vec<Machine>, DatabaseError> {
        let machines = sqlx::query_as::<_, Machine>(
            "SELECT * FROM machines WHERE serial_status = 'PENDING' ORDER BY claimed_at ASC, rowid ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(machines)
    }

    // =========================================================================
    // Serial verification transitions
    // =========================================================================

    /// Record a claim: status `PENDING`, claim fields set, rejection reason
    /// cleared. `None` if the machine is approved or no longer assigned to
    /// the warden.
    pub async fn record_claim(
        &self,
        params: &ClaimParams<'_>,
        now: i64,
    ) -> Result<Option<Machine>, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE machines
            SET serial_status = 'PENDING',
                claimed_serial = ?, claimed_install_date = ?, claim_notes = ?, claimed_at = ?,
                rejection_reason = NULL,
                hostel_id = COALESCE(?, hostel_id),
                updated_at = ?
            WHERE id = ? AND warden_id = ? AND serial_status IS NOT ?
            ",
        )
        .bind(params.claimed_serial)
        .bind(params.install_date)
        .bind(params.notes)
        .bind(now)
        .bind(params.hostel_id)
        .bind(now)
        .bind(params.machine_id)
        .bind(params.warden_id)
        .bind(APPROVED)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_machine(params.machine_id).await.map(Some)
    }

    /// Record a rejection. Claim fields are left in place.
    pub async fn record_rejection(
        &self,
        machine_id: &str,
        reason: &str,
        reviewer_id: &str,
        now: i64,
    ) -> Result<Option<Machine>, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE machines
            SET serial_status = 'REJECTED', rejection_reason = ?,
                reviewed_by = ?, reviewed_at = ?, updated_at = ?
            WHERE id = ? AND serial_status IS NOT ?
            ",
        )
        .bind(reason)
        .bind(reviewer_id)
        .bind(now)
        .bind(now)
        .bind(machine_id)
        .bind(APPROVED)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_machine(machine_id).await.map(Some)
    }

    /// Approve a claim: canonical serial, review stamp, installation date and
    /// warranty window in one transaction.
    ///
    /// A serial already canonical on another machine fails with
    /// `UniqueViolation` and nothing is written.
    pub async fn record_approval(
        &self,
        params: &ApprovalParams<'_>,
        now: i64,
    ) -> Result<Option<Machine>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r"
            UPDATE machines
            SET serial_number = ?, serial_status = 'APPROVED',
                reviewed_by = ?, reviewed_at = ?, rejection_reason = NULL,
                installation_date = ?,
                warranty_start = ?, warranty_end = ?, warranty_status = ?,
                warranty_claimed_by = ?, warranty_claimed_at = ?,
                updated_at = ?
            WHERE id = ? AND serial_status IS NOT ?
            ",
        )
        .bind(params.serial_number)
        .bind(params.reviewer_id)
        .bind(now)
        .bind(params.installation_date)
        .bind(params.warranty_start)
        .bind(params.warranty_end)
        .bind(params.warranty_status.as_str())
        .bind(params.warranty_claimed_by)
        .bind(now)
        .bind(now)
        .bind(params.machine_id)
        .bind(APPROVED)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = ?")
            .bind(params.machine_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(machine))
    }

    /// Overwrite the installation date and warranty window of an approved
    /// machine assigned to the warden.
    pub async fn record_manual_warranty(
        &self,
        params: &WarrantyParams<'_>,
        now: i64,
    ) -> Result<Option<Machine>, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE machines
            SET installation_date = ?,
                warranty_start = ?, warranty_end = ?, warranty_status = ?,
                warranty_claimed_by = ?, warranty_claimed_at = ?,
                hostel_id = COALESCE(?, hostel_id),
                updated_at = ?
            WHERE id = ? AND warden_id = ? AND serial_status = ?
            ",
        )
        .bind(params.installation_date)
        .bind(params.warranty_start)
        .bind(params.warranty_end)
        .bind(params.warranty_status.as_str())
        .bind(params.warden_id)
        .bind(now)
        .bind(params.hostel_id)
        .bind(now)
        .bind(params.machine_id)
        .bind(params.warden_id)
        .bind(APPROVED)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_machine(params.machine_id).await.map(Some)
    }
}

async fn insert_placeholder(
    conn: &mut SqliteConnection,
    params: &PlaceholderParams<'_>,
    now: i64,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r"
        INSERT INTO machines
            (id, temp_code, warden_id, district_id, hostel_id, uploaded_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(params.id)
    .bind(params.temp_code)
    .bind(params.warden_id)
    .bind(params.district_id)
    .bind(params.hostel_id)
    .bind(params.uploaded_by)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn assign_to_warden(
    conn: &mut SqliteConnection,
    machine_ids: &[String],
    warden_id: &str,
    hostel_id: Option<&str>,
    now: i64,
) -> Result<u64, DatabaseError> {
    if machine_ids.is_empty() {
        return Ok(0);
    }

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE machines SET warden_id = ");
    qb.push_bind(warden_id);
    qb.push(", hostel_id = COALESCE(");
    qb.push_bind(hostel_id);
    qb.push(", hostel_id), updated_at = ");
    qb.push_bind(now);
    qb.push(" WHERE id IN (");
    let mut list = qb.separated(", ");
    for id in machine_ids {
        list.push_bind(id);
    }
    list.push_unseparated(")");

    let result = qb.build().execute(&mut *conn).await?;

    Ok(result.rows_affected())
}
