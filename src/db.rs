use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// Calendar dates are stored as ISO text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Scheduled date-times are naive facility-local time, second precision.
/// Lexicographic order of this format equals chronological order.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open (or create) the registry database at `path` and make sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    setup_database(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema. Used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Per-connection setting; records must never point at missing residents or beds
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS beds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bed_number TEXT UNIQUE NOT NULL,
            room_number TEXT NOT NULL,
            floor INTEGER NOT NULL,
            bed_type TEXT,
            status TEXT NOT NULL DEFAULT 'vacant',
            monthly_rate REAL,
            amenities TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS residents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            gender TEXT NOT NULL,
            phone TEXT,
            emergency_contact TEXT,
            emergency_phone TEXT,
            address TEXT,
            medical_conditions TEXT,
            allergies TEXT,
            room_number TEXT,
            bed_id INTEGER REFERENCES beds(id),
            admission_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS medications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER NOT NULL REFERENCES residents(id),
            medication_name TEXT NOT NULL,
            dosage TEXT NOT NULL,
            frequency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            prescribed_by TEXT,
            instructions TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS checkups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER NOT NULL REFERENCES residents(id),
            checkup_type TEXT NOT NULL,
            scheduled_date TEXT NOT NULL,
            doctor_name TEXT,
            location TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled',
            notes TEXT,
            results TEXT,
            follow_up_required INTEGER NOT NULL DEFAULT 0,
            follow_up_date TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            event_date TEXT NOT NULL,
            duration_minutes INTEGER,
            location TEXT,
            organizer TEXT,
            max_participants INTEGER,
            current_participants INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'planned',
            event_type TEXT,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurrence_pattern TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER REFERENCES residents(id),
            filename TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER,
            mime_type TEXT,
            document_type TEXT NOT NULL,
            description TEXT,
            uploaded_by TEXT,
            is_confidential INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS staff (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            phone TEXT,
            role TEXT NOT NULL,
            department TEXT,
            hire_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            shift TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS visitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER NOT NULL REFERENCES residents(id),
            visitor_name TEXT NOT NULL,
            relationship TEXT,
            phone TEXT,
            visit_date TEXT NOT NULL,
            check_in_time TEXT,
            check_out_time TEXT,
            purpose TEXT,
            approved_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS billing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER NOT NULL REFERENCES residents(id),
            billing_period_start TEXT NOT NULL,
            billing_period_end TEXT NOT NULL,
            accommodation_charges REAL NOT NULL DEFAULT 0,
            medical_charges REAL NOT NULL DEFAULT 0,
            food_charges REAL NOT NULL DEFAULT 0,
            other_charges REAL NOT NULL DEFAULT 0,
            total_amount REAL NOT NULL,
            amount_paid REAL NOT NULL DEFAULT 0,
            balance REAL NOT NULL DEFAULT 0,
            due_date TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            audit_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        -- One resident per bed, enforced by the store as well
        CREATE UNIQUE INDEX IF NOT EXISTS idx_residents_bed
            ON residents(bed_id) WHERE bed_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_residents_status ON residents(status);
        CREATE INDEX IF NOT EXISTS idx_residents_name ON residents(name);
        CREATE INDEX IF NOT EXISTS idx_beds_status ON beds(status);
        CREATE INDEX IF NOT EXISTS idx_medications_resident ON medications(resident_id);
        CREATE INDEX IF NOT EXISTS idx_checkups_scheduled ON checkups(scheduled_date);
        CREATE INDEX IF NOT EXISTS idx_events_date ON events(event_date);
        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);",
    )?;

    Ok(())
}

// ============================================================================
// Column codecs
// ============================================================================

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Sub-second parts are dropped; see [`whole_seconds`].
pub fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

/// `datetime` at the precision the store keeps. Record constructors and
/// window bounds go through this so a stored value equals its input.
pub fn whole_seconds(datetime: NaiveDateTime) -> NaiveDateTime {
    datetime.with_nanosecond(0).unwrap_or(datetime)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_datetime_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

/// Status enums are stored by their lowercase name.
pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

// ============================================================================
// Audit trail
// ============================================================================

/// One recorded occupancy transition. Append-only.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEntry {
    pub audit_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub data: serde_json::Value,
    pub actor: String,
}

impl AuditEntry {
    pub fn new(
        action: &str,
        entity_type: &str,
        entity_id: i64,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let data_json = serde_json::to_string(&entry.data)?;

    conn.execute(
        "INSERT INTO audit_log (
            audit_id, timestamp, action, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.audit_id,
            entry.timestamp.to_rfc3339(),
            entry.action,
            entry.entity_type,
            entry.entity_id,
            data_json,
            entry.actor,
        ],
    )?;

    Ok(())
}

/// Audit entries for one entity, newest first.
pub fn get_audit_entries(
    conn: &Connection,
    entity_type: &str,
    entity_id: i64,
) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT audit_id, timestamp, action, entity_type, entity_id, data, actor
         FROM audit_log
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let entries = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(AuditEntry {
                audit_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                action: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(entries)
}

/// Admit a resident with fixed details and return its id. Child records in
/// tests need a real parent row.
#[cfg(test)]
pub(crate) fn admit_test_resident(conn: &Connection, name: &str) -> i64 {
    use crate::entities::resident::{insert_resident, NewResident};

    let dob = NaiveDate::from_ymd_opt(1938, 6, 15).unwrap();
    let admitted = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    insert_resident(conn, &NewResident::new(name, "F", dob, admitted)).unwrap().id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('residents', 'beds', 'medications', 'checkups', 'events',
                              'documents', 'staff', 'visitors', 'billing', 'audit_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = open_in_memory().unwrap();
        let enforced: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(enforced);

        let orphan = conn.execute(
            "INSERT INTO medications (resident_id, medication_name, dosage, frequency, start_date, created_at)
             VALUES (999, 'A', '1', 'daily', '2024-01-01', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_datetime_format_sorts_chronologically() {
        let a = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap().and_hms_opt(23, 0, 0).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap().and_hms_opt(8, 5, 0).unwrap();

        assert_eq!(format_datetime(b), "2024-10-01 08:05:00");
        assert!(format_datetime(a) < format_datetime(b));

        let fractional = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap().and_hms_milli_opt(8, 5, 0, 500).unwrap();
        assert_eq!(whole_seconds(fractional), b);
        assert_eq!(format_datetime(fractional), format_datetime(whole_seconds(fractional)));
    }

    #[test]
    fn test_audit_log() {
        let conn = open_in_memory().unwrap();

        let entry = AuditEntry::new(
            "bed_assigned",
            "bed",
            12,
            serde_json::json!({"resident_id": 4}),
            "test_actor",
        );
        insert_audit_entry(&conn, &entry).unwrap();

        let entries = get_audit_entries(&conn, "bed", 12).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "bed_assigned");
        assert_eq!(entries[0].data["resident_id"], 4);
        assert_eq!(entries[0].audit_id, entry.audit_id);

        assert!(get_audit_entries(&conn, "resident", 12).unwrap().is_empty());
    }
}
