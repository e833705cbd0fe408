// 🛏️ Occupancy - the bed ↔ resident relation
//
// Invariants kept by every function in this module:
// - a resident holds at most one bed
// - a bed is held by at most one resident, and only while it is Occupied
// - a resident's room_number mirrors the room of the bed it holds
//
// Each transition runs inside one IMMEDIATE transaction: the write lock is
// taken before the bed status is read, so two writers cannot both see a bed
// as vacant. Any error drops the transaction, which rolls everything back.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{insert_audit_entry, AuditEntry};
use crate::entities::bed::{get_bed, BedStatus};
use crate::entities::resident::get_resident;
use crate::error::{CareError, Result};

const ACTOR: &str = "occupancy";

/// Outcome of a successful assignment or move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedAssignment {
    pub bed_id: i64,
    pub resident_id: i64,
    pub room_number: String,
    /// Bed the resident left, when this was a move.
    pub previous_bed_id: Option<i64>,
}

// ============================================================================
// TRANSITIONS
// ============================================================================

/// Put a resident into a vacant bed.
///
/// Fails without touching anything when the bed is missing or not vacant,
/// when the resident is missing, or when the resident already holds a bed
/// (use [`move_resident`] for transfers).
pub fn assign_bed(conn: &mut Connection, bed_id: i64, resident_id: i64) -> Result<BedAssignment> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let assignment = match occupy(&tx, bed_id, resident_id) {
        Ok(assignment) => assignment,
        Err(e) => {
            warn!(bed_id, resident_id, error = %e, "bed assignment rejected");
            return Err(e);
        }
    };
    insert_audit_entry(
        &tx,
        &AuditEntry::new(
            "bed_assigned",
            "bed",
            bed_id,
            serde_json::json!({
                "resident_id": resident_id,
                "room_number": assignment.room_number,
            }),
            ACTOR,
        ),
    )?;

    tx.commit()?;
    info!(bed_id, resident_id, room = %assignment.room_number, "bed assigned");
    Ok(assignment)
}

/// Vacate a bed. Returns the resident that was holding it, if any.
///
/// Releasing a bed nobody holds is allowed and just marks it vacant (this is
/// also how a bed comes back from maintenance).
pub fn release_bed(conn: &mut Connection, bed_id: i64) -> Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let released = match vacate(&tx, bed_id) {
        Ok(released) => released,
        Err(e) => {
            warn!(bed_id, error = %e, "bed release rejected");
            return Err(e);
        }
    };

    tx.commit()?;
    info!(bed_id, resident_id = ?released, "bed released");
    Ok(released)
}

/// Transfer a resident to another vacant bed, releasing the one they hold.
///
/// A resident without a bed is simply assigned. The new bed is checked
/// before the old one is released, so a refused move changes nothing.
pub fn move_resident(conn: &mut Connection, resident_id: i64, new_bed_id: i64) -> Result<BedAssignment> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let resident =
        get_resident(&tx, resident_id)?.ok_or_else(|| CareError::not_found("resident", resident_id))?;
    let target = get_bed(&tx, new_bed_id)?.ok_or_else(|| CareError::not_found("bed", new_bed_id))?;
    if target.status != BedStatus::Vacant {
        warn!(resident_id, new_bed_id, status = %target.status, "move rejected");
        return Err(CareError::BedNotVacant {
            bed_id: new_bed_id,
            status: target.status.to_string(),
        });
    }

    if let Some(old_bed_id) = resident.bed_id {
        vacate(&tx, old_bed_id)?;
    }
    let mut assignment = occupy(&tx, new_bed_id, resident_id)?;
    assignment.previous_bed_id = resident.bed_id;

    insert_audit_entry(
        &tx,
        &AuditEntry::new(
            "resident_moved",
            "resident",
            resident_id,
            serde_json::json!({
                "from_bed_id": assignment.previous_bed_id,
                "to_bed_id": new_bed_id,
                "room_number": assignment.room_number,
            }),
            ACTOR,
        ),
    )?;

    tx.commit()?;
    info!(resident_id, from = ?assignment.previous_bed_id, to = new_bed_id, "resident moved");
    Ok(assignment)
}

/// Tables whose rows point at a resident and block its deletion.
const RESIDENT_DEPENDENTS: [&str; 5] = ["medications", "checkups", "visitors", "billing", "documents"];

/// Delete a resident record, vacating their bed first.
///
/// Refused with `ResidentReferenced` while any medication, checkup, visit,
/// bill or document still points at the resident; nothing changes then.
pub fn delete_resident(conn: &mut Connection, resident_id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let resident =
        get_resident(&tx, resident_id)?.ok_or_else(|| CareError::not_found("resident", resident_id))?;
    if let Some(table) = first_dependent(&tx, resident_id)? {
        warn!(resident_id, table, "resident deletion rejected");
        return Err(CareError::ResidentReferenced { resident_id, table });
    }
    if let Some(bed_id) = resident.bed_id {
        vacate(&tx, bed_id)?;
    }
    tx.execute("DELETE FROM residents WHERE id = ?1", [resident_id])?;

    tx.commit()?;
    info!(resident_id, released_bed = ?resident.bed_id, "resident deleted");
    Ok(())
}

fn first_dependent(conn: &Connection, resident_id: i64) -> Result<Option<&'static str>> {
    for table in RESIDENT_DEPENDENTS {
        let referenced: bool = conn.query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE resident_id = ?1)"),
            [resident_id],
            |row| row.get(0),
        )?;
        if referenced {
            return Ok(Some(table));
        }
    }
    Ok(None)
}

/// Bed and resident writes for an assignment. Caller owns the transaction.
fn occupy(conn: &Connection, bed_id: i64, resident_id: i64) -> Result<BedAssignment> {
    let bed = get_bed(conn, bed_id)?.ok_or_else(|| CareError::not_found("bed", bed_id))?;
    if bed.status != BedStatus::Vacant {
        return Err(CareError::BedNotVacant {
            bed_id,
            status: bed.status.to_string(),
        });
    }

    let resident =
        get_resident(conn, resident_id)?.ok_or_else(|| CareError::not_found("resident", resident_id))?;
    if let Some(held) = resident.bed_id {
        return Err(CareError::ResidentAlreadyAssigned {
            resident_id,
            bed_id: held,
        });
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE beds SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![BedStatus::Occupied.as_str(), now, bed_id],
    )?;
    conn.execute(
        "UPDATE residents SET bed_id = ?1, room_number = ?2, updated_at = ?3 WHERE id = ?4",
        params![bed_id, bed.room_number, now, resident_id],
    )?;

    Ok(BedAssignment {
        bed_id,
        resident_id,
        room_number: bed.room_number,
        previous_bed_id: None,
    })
}

/// Clear whoever holds `bed_id` and mark it vacant, with an audit entry.
/// Caller owns the transaction.
fn vacate(conn: &Connection, bed_id: i64) -> Result<Option<i64>> {
    if get_bed(conn, bed_id)?.is_none() {
        return Err(CareError::not_found("bed", bed_id));
    }

    let holder: Option<i64> = conn
        .query_row("SELECT id FROM residents WHERE bed_id = ?1", [bed_id], |row| row.get(0))
        .optional()?;

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE residents SET bed_id = NULL, updated_at = ?1 WHERE bed_id = ?2",
        params![now, bed_id],
    )?;
    conn.execute(
        "UPDATE beds SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![BedStatus::Vacant.as_str(), now, bed_id],
    )?;

    insert_audit_entry(
        conn,
        &AuditEntry::new(
            "bed_released",
            "bed",
            bed_id,
            serde_json::json!({ "resident_id": holder }),
            ACTOR,
        ),
    )?;

    Ok(holder)
}

// ============================================================================
// CONSISTENCY CHECK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccupancyViolation {
    /// Bed marked occupied but no resident points at it.
    OccupiedWithoutResident { bed_id: i64 },
    /// Resident points at a bed id that does not exist.
    ResidentOnMissingBed { resident_id: i64, bed_id: i64 },
    /// Resident points at a bed that is vacant or under maintenance.
    ResidentOnUnoccupiedBed {
        resident_id: i64,
        bed_id: i64,
        status: BedStatus,
    },
    /// Resident's room does not match the room of the bed it holds.
    RoomMismatch {
        resident_id: i64,
        bed_id: i64,
        resident_room: Option<String>,
        bed_room: String,
    },
}

/// Scan the store for records that break the occupancy invariants.
/// An empty result means the store is consistent.
pub fn check_occupancy(conn: &Connection) -> Result<Vec<OccupancyViolation>> {
    let mut violations = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT b.id FROM beds b
         WHERE b.status = ?1
           AND NOT EXISTS (SELECT 1 FROM residents r WHERE r.bed_id = b.id)
         ORDER BY b.id",
    )?;
    let orphaned = stmt
        .query_map([BedStatus::Occupied.as_str()], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    violations.extend(
        orphaned
            .into_iter()
            .map(|bed_id| OccupancyViolation::OccupiedWithoutResident { bed_id }),
    );

    let mut stmt = conn.prepare(
        "SELECT r.id, r.bed_id, r.room_number, b.status, b.room_number
         FROM residents r
         LEFT JOIN beds b ON b.id = r.bed_id
         WHERE r.bed_id IS NOT NULL
         ORDER BY r.id",
    )?;
    let placements = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (resident_id, bed_id, resident_room, bed_status, bed_room) in placements {
        let (Some(bed_status), Some(bed_room)) = (bed_status, bed_room) else {
            violations.push(OccupancyViolation::ResidentOnMissingBed { resident_id, bed_id });
            continue;
        };

        let status: BedStatus = bed_status.parse().map_err(CareError::InvalidValue)?;
        if status != BedStatus::Occupied {
            violations.push(OccupancyViolation::ResidentOnUnoccupiedBed {
                resident_id,
                bed_id,
                status,
            });
        }
        if resident_room.as_deref() != Some(bed_room.as_str()) {
            violations.push(OccupancyViolation::RoomMismatch {
                resident_id,
                bed_id,
                resident_room,
                bed_room,
            });
        }
    }

    Ok(violations)
}
