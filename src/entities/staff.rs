use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{date_column, format_date, timestamp_column};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// admin, nurse, doctor, caregiver
    pub role: String,
    pub department: Option<String>,
    pub hire_date: NaiveDate,
    pub is_active: bool,
    /// morning, evening, night
    pub shift: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaff {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub department: Option<String>,
    pub hire_date: NaiveDate,
    pub shift: Option<String>,
}

impl NewStaff {
    pub fn new(name: &str, email: &str, role: &str, hire_date: NaiveDate) -> Self {
        NewStaff {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            role: role.to_string(),
            department: None,
            hire_date,
            shift: None,
        }
    }
}

const STAFF_COLUMNS: &str =
    "id, name, email, phone, role, department, hire_date, is_active, shift, created_at";

fn staff_from_row(row: &Row<'_>) -> rusqlite::Result<Staff> {
    Ok(Staff {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        role: row.get(4)?,
        department: row.get(5)?,
        hire_date: date_column(row, 6)?,
        is_active: row.get(7)?,
        shift: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

pub fn insert_staff(conn: &Connection, staff: &NewStaff) -> Result<Staff> {
    conn.execute(
        "INSERT INTO staff (name, email, phone, role, department, hire_date, shift, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            staff.name,
            staff.email,
            staff.phone,
            staff.role,
            staff.department,
            format_date(staff.hire_date),
            staff.shift,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    let staff = conn.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"),
        [id],
        staff_from_row,
    )?;
    Ok(staff)
}

/// Active staff only, paginated.
pub fn get_staff(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Staff>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff WHERE is_active = 1 ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let staff = stmt
        .query_map(params![limit, skip], staff_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(staff)
}

pub fn deactivate_staff(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("UPDATE staff SET is_active = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(CareError::not_found("staff", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_listing_skips_inactive_staff() {
        let conn = open_in_memory().unwrap();
        let hired = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let nurse = insert_staff(&conn, &NewStaff::new("Ann", "ann@home.test", "nurse", hired)).unwrap();
        insert_staff(&conn, &NewStaff::new("Bo", "bo@home.test", "caregiver", hired)).unwrap();

        deactivate_staff(&conn, nurse.id).unwrap();

        let staff = get_staff(&conn, 0, 100).unwrap();
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].name, "Bo");
        assert!(deactivate_staff(&conn, 99).unwrap_err().is_not_found());
    }

    #[test]
    fn test_email_is_unique() {
        let conn = open_in_memory().unwrap();
        let hired = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        insert_staff(&conn, &NewStaff::new("Ann", "ann@home.test", "nurse", hired)).unwrap();
        assert!(insert_staff(&conn, &NewStaff::new("Ann B", "ann@home.test", "nurse", hired)).is_err());
    }
}
