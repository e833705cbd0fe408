// Resident records.
//
// bed_id and room_number are owned by the occupancy module: nothing in here
// writes them except the initial insert (which never assigns a bed).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{date_column, enum_column, format_date, opt_timestamp_column, timestamp_column};
use crate::error::{CareError, Result};
use crate::temporal::anniversary_in;

// ============================================================================
// RESIDENT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentStatus {
    #[default]
    Active,
    Inactive,
    Discharged,
    Deceased,
}

impl ResidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidentStatus::Active => "active",
            ResidentStatus::Inactive => "inactive",
            ResidentStatus::Discharged => "discharged",
            ResidentStatus::Deceased => "deceased",
        }
    }
}

impl FromStr for ResidentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ResidentStatus::Active),
            "inactive" => Ok(ResidentStatus::Inactive),
            "discharged" => Ok(ResidentStatus::Discharged),
            "deceased" => Ok(ResidentStatus::Deceased),
            other => Err(format!("unknown resident status: {other}")),
        }
    }
}

impl fmt::Display for ResidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RESIDENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: i64,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub address: Option<String>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    /// Mirrors the assigned bed's room while a bed is held.
    pub room_number: Option<String>,
    pub bed_id: Option<i64>,
    pub admission_date: NaiveDate,
    pub status: ResidentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resident {
    /// Completed years of age on `date`.
    ///
    /// Uses the same anniversary rule as the birthday queries, so a Feb 29
    /// resident gains a year on Feb 28 in non-leap years.
    pub fn age_on(&self, date: NaiveDate) -> i32 {
        let years = date.year() - self.date_of_birth.year();
        if anniversary_in(self.date_of_birth, date.year()) > date {
            years - 1
        } else {
            years
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ResidentStatus::Active
    }

    pub fn has_bed(&self) -> bool {
        self.bed_id.is_some()
    }
}

/// Admission data for a new resident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResident {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub address: Option<String>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub room_number: Option<String>,
    pub admission_date: NaiveDate,
    #[serde(default)]
    pub status: ResidentStatus,
    pub notes: Option<String>,
}

impl NewResident {
    pub fn new(name: &str, gender: &str, date_of_birth: NaiveDate, admission_date: NaiveDate) -> Self {
        NewResident {
            name: name.to_string(),
            date_of_birth,
            gender: gender.to_string(),
            phone: None,
            emergency_contact: None,
            emergency_phone: None,
            address: None,
            medical_conditions: None,
            allergies: None,
            room_number: None,
            admission_date,
            status: ResidentStatus::Active,
            notes: None,
        }
    }

    pub fn with_status(mut self, status: ResidentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update. Bed and room placement are not updatable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResidentUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub address: Option<String>,
    pub medical_conditions: Option<String>,
    pub allergies: Option<String>,
    pub status: Option<ResidentStatus>,
    pub notes: Option<String>,
}

impl ResidentUpdate {
    fn apply(&self, resident: &mut Resident) {
        if let Some(name) = &self.name {
            resident.name = name.clone();
        }
        overlay(&mut resident.phone, &self.phone);
        overlay(&mut resident.emergency_contact, &self.emergency_contact);
        overlay(&mut resident.emergency_phone, &self.emergency_phone);
        overlay(&mut resident.address, &self.address);
        overlay(&mut resident.medical_conditions, &self.medical_conditions);
        overlay(&mut resident.allergies, &self.allergies);
        overlay(&mut resident.notes, &self.notes);
        if let Some(status) = self.status {
            resident.status = status;
        }
    }
}

fn overlay(field: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        field.clone_from(value);
    }
}

// ============================================================================
// DATA ACCESS
// ============================================================================

const RESIDENT_COLUMNS: &str = "id, name, date_of_birth, gender, phone, emergency_contact,
    emergency_phone, address, medical_conditions, allergies, room_number, bed_id,
    admission_date, status, notes, created_at, updated_at";

fn resident_from_row(row: &Row<'_>) -> rusqlite::Result<Resident> {
    Ok(Resident {
        id: row.get(0)?,
        name: row.get(1)?,
        date_of_birth: date_column(row, 2)?,
        gender: row.get(3)?,
        phone: row.get(4)?,
        emergency_contact: row.get(5)?,
        emergency_phone: row.get(6)?,
        address: row.get(7)?,
        medical_conditions: row.get(8)?,
        allergies: row.get(9)?,
        room_number: row.get(10)?,
        bed_id: row.get(11)?,
        admission_date: date_column(row, 12)?,
        status: enum_column(row, 13)?,
        notes: row.get(14)?,
        created_at: timestamp_column(row, 15)?,
        updated_at: opt_timestamp_column(row, 16)?,
    })
}

fn query_residents<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Resident>> {
    let mut stmt = conn.prepare(sql)?;
    let residents = stmt
        .query_map(params, resident_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(residents)
}

pub fn insert_resident(conn: &Connection, resident: &NewResident) -> Result<Resident> {
    conn.execute(
        "INSERT INTO residents (
            name, date_of_birth, gender, phone, emergency_contact, emergency_phone,
            address, medical_conditions, allergies, room_number, admission_date,
            status, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            resident.name,
            format_date(resident.date_of_birth),
            resident.gender,
            resident.phone,
            resident.emergency_contact,
            resident.emergency_phone,
            resident.address,
            resident.medical_conditions,
            resident.allergies,
            resident.room_number,
            format_date(resident.admission_date),
            resident.status.as_str(),
            resident.notes,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_resident(conn, id)?.ok_or_else(|| CareError::not_found("resident", id))
}

pub fn get_resident(conn: &Connection, id: i64) -> Result<Option<Resident>> {
    let resident = conn
        .query_row(
            &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE id = ?1"),
            [id],
            resident_from_row,
        )
        .optional()?;
    Ok(resident)
}

pub fn get_residents(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Resident>> {
    query_residents(
        conn,
        &format!("SELECT {RESIDENT_COLUMNS} FROM residents ORDER BY id LIMIT ?1 OFFSET ?2"),
        params![limit, skip],
    )
}

/// Residents with the given status, in id order.
pub fn get_residents_by_status(conn: &Connection, status: ResidentStatus) -> Result<Vec<Resident>> {
    query_residents(
        conn,
        &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE status = ?1 ORDER BY id"),
        [status.as_str()],
    )
}

pub fn get_recent_residents(conn: &Connection, limit: u32) -> Result<Vec<Resident>> {
    query_residents(
        conn,
        &format!(
            "SELECT {RESIDENT_COLUMNS} FROM residents ORDER BY created_at DESC, id DESC LIMIT ?1"
        ),
        [limit],
    )
}

/// Case-insensitive substring search over name, room and phone.
pub fn search_residents(conn: &Connection, query: &str) -> Result<Vec<Resident>> {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{escaped}%");

    query_residents(
        conn,
        &format!(
            "SELECT {RESIDENT_COLUMNS} FROM residents
             WHERE name LIKE ?1 ESCAPE '\\'
                OR room_number LIKE ?1 ESCAPE '\\'
                OR phone LIKE ?1 ESCAPE '\\'
             ORDER BY id"
        ),
        [pattern],
    )
}

pub fn count_residents_by_status(conn: &Connection, status: ResidentStatus) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM residents WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn update_resident(conn: &Connection, id: i64, update: &ResidentUpdate) -> Result<Resident> {
    let mut resident = get_resident(conn, id)?.ok_or_else(|| CareError::not_found("resident", id))?;
    update.apply(&mut resident);

    conn.execute(
        "UPDATE residents
         SET name = ?1, phone = ?2, emergency_contact = ?3, emergency_phone = ?4,
             address = ?5, medical_conditions = ?6, allergies = ?7, status = ?8,
             notes = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            resident.name,
            resident.phone,
            resident.emergency_contact,
            resident.emergency_phone,
            resident.address,
            resident.medical_conditions,
            resident.allergies,
            resident.status.as_str(),
            resident.notes,
            Utc::now().to_rfc3339(),
            id,
        ],
    )?;

    get_resident(conn, id)?.ok_or_else(|| CareError::not_found("resident", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn admit(conn: &Connection, name: &str, dob: NaiveDate) -> Resident {
        insert_resident(conn, &NewResident::new(name, "Female", dob, date(2023, 1, 10))).unwrap()
    }

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [
            ResidentStatus::Active,
            ResidentStatus::Inactive,
            ResidentStatus::Discharged,
            ResidentStatus::Deceased,
        ] {
            assert_eq!(status.as_str().parse::<ResidentStatus>().unwrap(), status);
        }
        assert!("retired".parse::<ResidentStatus>().is_err());
    }

    #[test]
    fn test_insert_and_get() {
        let conn = open_in_memory().unwrap();
        let mut admission = NewResident::new("Margaret Hale", "Female", date(1941, 3, 14), date(2023, 6, 1));
        admission.allergies = Some("penicillin".to_string());

        let resident = insert_resident(&conn, &admission).unwrap();

        assert!(resident.id > 0);
        assert_eq!(resident.date_of_birth, date(1941, 3, 14));
        assert_eq!(resident.status, ResidentStatus::Active);
        assert_eq!(resident.allergies.as_deref(), Some("penicillin"));
        assert_eq!(resident.bed_id, None);
        assert_eq!(get_resident(&conn, resident.id).unwrap(), Some(resident));
        assert_eq!(get_resident(&conn, 999).unwrap(), None);
    }

    #[test]
    fn test_age_on() {
        let conn = open_in_memory().unwrap();
        let resident = admit(&conn, "Arthur Penn", date(1940, 6, 15));

        assert_eq!(resident.age_on(date(2024, 6, 14)), 83);
        assert_eq!(resident.age_on(date(2024, 6, 15)), 84);

        let leapling = admit(&conn, "Leap Day", date(1944, 2, 29));
        assert_eq!(leapling.age_on(date(2023, 2, 27)), 78);
        assert_eq!(leapling.age_on(date(2023, 2, 28)), 79);
        assert_eq!(leapling.age_on(date(2024, 2, 28)), 79);
        assert_eq!(leapling.age_on(date(2024, 2, 29)), 80);
    }

    #[test]
    fn test_status_filter_and_count() {
        let conn = open_in_memory().unwrap();
        admit(&conn, "A", date(1940, 1, 1));
        admit(&conn, "B", date(1941, 1, 1));
        insert_resident(
            &conn,
            &NewResident::new("C", "Male", date(1942, 1, 1), date(2020, 1, 1))
                .with_status(ResidentStatus::Discharged),
        )
        .unwrap();

        let active = get_residents_by_status(&conn, ResidentStatus::Active).unwrap();
        assert_eq!(active.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(count_residents_by_status(&conn, ResidentStatus::Active).unwrap(), 2);
        assert_eq!(count_residents_by_status(&conn, ResidentStatus::Discharged).unwrap(), 1);
    }

    #[test]
    fn test_pagination_and_recent() {
        let conn = open_in_memory().unwrap();
        for name in ["A", "B", "C", "D"] {
            admit(&conn, name, date(1945, 5, 5));
        }

        let page = get_residents(&conn, 1, 2).unwrap();
        assert_eq!(page.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["B", "C"]);

        let recent = get_recent_residents(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "D");
    }

    #[test]
    fn test_search() {
        let conn = open_in_memory().unwrap();
        let mut with_phone = NewResident::new("Edith Crawley", "Female", date(1939, 8, 2), date(2022, 2, 2));
        with_phone.phone = Some("555-0101".to_string());
        with_phone.room_number = Some("12B".to_string());
        insert_resident(&conn, &with_phone).unwrap();
        admit(&conn, "Walter 100%", date(1938, 1, 1));

        assert_eq!(search_residents(&conn, "crawley").unwrap().len(), 1);
        assert_eq!(search_residents(&conn, "0101").unwrap().len(), 1);
        assert_eq!(search_residents(&conn, "12B").unwrap().len(), 1);
        // % is literal, not a wildcard
        assert_eq!(search_residents(&conn, "100%").unwrap().len(), 1);
        assert_eq!(search_residents(&conn, "%").unwrap().len(), 1);
        assert!(search_residents(&conn, "nobody").unwrap().is_empty());
    }

    #[test]
    fn test_update_leaves_placement_alone() {
        let conn = open_in_memory().unwrap();
        let mut admission = NewResident::new("Ruth", "Female", date(1943, 4, 4), date(2023, 1, 1));
        admission.room_number = Some("7".to_string());
        let resident = insert_resident(&conn, &admission).unwrap();

        let update = ResidentUpdate {
            notes: Some("prefers tea".to_string()),
            status: Some(ResidentStatus::Inactive),
            ..Default::default()
        };
        let updated = update_resident(&conn, resident.id, &update).unwrap();

        assert_eq!(updated.notes.as_deref(), Some("prefers tea"));
        assert_eq!(updated.status, ResidentStatus::Inactive);
        assert_eq!(updated.name, "Ruth");
        assert_eq!(updated.room_number.as_deref(), Some("7"));
        assert!(updated.updated_at.is_some());

        let err = update_resident(&conn, 404, &update).unwrap_err();
        assert!(err.is_not_found());
    }
}
