use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{date_column, format_date, opt_date_column, timestamp_column};
use crate::entities::resident::ResidentStatus;
use crate::error::{CareError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: i64,
    pub resident_id: i64,
    pub medication_name: String,
    pub dosage: String,
    /// daily, twice daily, ...
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub prescribed_by: Option<String>,
    pub instructions: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedication {
    pub resident_id: i64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub prescribed_by: Option<String>,
    pub instructions: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

impl NewMedication {
    pub fn new(resident_id: i64, name: &str, dosage: &str, frequency: &str, start_date: NaiveDate) -> Self {
        NewMedication {
            resident_id,
            medication_name: name.to_string(),
            dosage: dosage.to_string(),
            frequency: frequency.to_string(),
            start_date,
            end_date: None,
            prescribed_by: None,
            instructions: None,
            is_active: true,
        }
    }
}

const MEDICATION_COLUMNS: &str = "id, resident_id, medication_name, dosage, frequency,
    start_date, end_date, prescribed_by, instructions, is_active, created_at";

fn medication_from_row(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        medication_name: row.get(2)?,
        dosage: row.get(3)?,
        frequency: row.get(4)?,
        start_date: date_column(row, 5)?,
        end_date: opt_date_column(row, 6)?,
        prescribed_by: row.get(7)?,
        instructions: row.get(8)?,
        is_active: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
    })
}

pub fn insert_medication(conn: &Connection, medication: &NewMedication) -> Result<Medication> {
    conn.execute(
        "INSERT INTO medications (
            resident_id, medication_name, dosage, frequency, start_date, end_date,
            prescribed_by, instructions, is_active, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            medication.resident_id,
            medication.medication_name,
            medication.dosage,
            medication.frequency,
            format_date(medication.start_date),
            medication.end_date.map(format_date),
            medication.prescribed_by,
            medication.instructions,
            medication.is_active,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
        [id],
        medication_from_row,
    )
    .optional()?
    .ok_or_else(|| CareError::not_found("medication", id))
}

/// Active medications for one resident.
pub fn get_resident_medications(conn: &Connection, resident_id: i64) -> Result<Vec<Medication>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications
         WHERE resident_id = ?1 AND is_active = 1
         ORDER BY id"
    ))?;
    let medications = stmt
        .query_map([resident_id], medication_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(medications)
}

pub fn set_medication_active(conn: &Connection, id: i64, is_active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE medications SET is_active = ?1 WHERE id = ?2",
        params![is_active, id],
    )?;
    if changed == 0 {
        return Err(CareError::not_found("medication", id));
    }
    Ok(())
}

/// Active residents with at least one active medication, each counted once.
pub fn count_residents_under_medication(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(DISTINCT r.id)
         FROM residents r
         JOIN medications m ON m.resident_id = r.id
         WHERE r.status = ?1 AND m.is_active = 1",
        [ResidentStatus::Active.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::entities::resident::{insert_resident, NewResident};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn admit(conn: &Connection, name: &str, status: ResidentStatus) -> i64 {
        insert_resident(
            conn,
            &NewResident::new(name, "Male", date(1940, 1, 1), date(2023, 1, 1)).with_status(status),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_json_body_defaults_to_active() {
        let body = r#"{"resident_id": 1, "medication_name": "Aspirin", "dosage": "81mg",
                       "frequency": "daily", "start_date": "2024-01-01"}"#;
        let new_medication: NewMedication = serde_json::from_str(body).unwrap();
        assert!(new_medication.is_active);
        assert_eq!(new_medication.end_date, None);
    }

    #[test]
    fn test_active_medications_only() {
        let conn = open_in_memory().unwrap();
        let rid = admit(&conn, "Frank", ResidentStatus::Active);

        let aspirin = insert_medication(&conn, &NewMedication::new(rid, "Aspirin", "81mg", "daily", date(2024, 1, 1))).unwrap();
        insert_medication(&conn, &NewMedication::new(rid, "Statin", "20mg", "nightly", date(2024, 1, 1))).unwrap();
        set_medication_active(&conn, aspirin.id, false).unwrap();

        let active = get_resident_medications(&conn, rid).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].medication_name, "Statin");
        assert!(set_medication_active(&conn, 999, false).unwrap_err().is_not_found());
    }

    #[test]
    fn test_under_medication_counts_distinct_active_residents() {
        let conn = open_in_memory().unwrap();
        let busy = admit(&conn, "Two meds", ResidentStatus::Active);
        let single = admit(&conn, "One med", ResidentStatus::Active);
        let stopped = admit(&conn, "Stopped", ResidentStatus::Active);
        let gone = admit(&conn, "Discharged", ResidentStatus::Discharged);
        admit(&conn, "None", ResidentStatus::Active);

        let start = date(2024, 1, 1);
        insert_medication(&conn, &NewMedication::new(busy, "A", "1", "daily", start)).unwrap();
        insert_medication(&conn, &NewMedication::new(busy, "B", "1", "daily", start)).unwrap();
        insert_medication(&conn, &NewMedication::new(single, "A", "1", "daily", start)).unwrap();
        let off = insert_medication(&conn, &NewMedication::new(stopped, "A", "1", "daily", start)).unwrap();
        set_medication_active(&conn, off.id, false).unwrap();
        insert_medication(&conn, &NewMedication::new(gone, "A", "1", "daily", start)).unwrap();

        assert_eq!(count_residents_under_medication(&conn).unwrap(), 2);
    }
}
