use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{datetime_column, format_datetime, opt_datetime_column, timestamp_column, whole_seconds};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: i64,
    pub resident_id: i64,
    pub visitor_name: String,
    /// family, friend, ...
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub visit_date: NaiveDateTime,
    pub check_in_time: Option<NaiveDateTime>,
    pub check_out_time: Option<NaiveDateTime>,
    pub purpose: Option<String>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisitor {
    pub resident_id: i64,
    pub visitor_name: String,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub visit_date: NaiveDateTime,
    pub purpose: Option<String>,
    pub approved_by: Option<String>,
}

impl NewVisitor {
    pub fn new(resident_id: i64, visitor_name: &str, visit_date: NaiveDateTime) -> Self {
        NewVisitor {
            resident_id,
            visitor_name: visitor_name.to_string(),
            relationship: None,
            phone: None,
            visit_date: whole_seconds(visit_date),
            purpose: None,
            approved_by: None,
        }
    }
}

const VISITOR_COLUMNS: &str = "id, resident_id, visitor_name, relationship, phone, visit_date,
    check_in_time, check_out_time, purpose, approved_by, created_at";

fn visitor_from_row(row: &Row<'_>) -> rusqlite::Result<Visitor> {
    Ok(Visitor {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        visitor_name: row.get(2)?,
        relationship: row.get(3)?,
        phone: row.get(4)?,
        visit_date: datetime_column(row, 5)?,
        check_in_time: opt_datetime_column(row, 6)?,
        check_out_time: opt_datetime_column(row, 7)?,
        purpose: row.get(8)?,
        approved_by: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
    })
}

pub fn insert_visitor(conn: &Connection, visitor: &NewVisitor) -> Result<Visitor> {
    conn.execute(
        "INSERT INTO visitors (
            resident_id, visitor_name, relationship, phone, visit_date, purpose, approved_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            visitor.resident_id,
            visitor.visitor_name,
            visitor.relationship,
            visitor.phone,
            format_datetime(visitor.visit_date),
            visitor.purpose,
            visitor.approved_by,
            Utc::now().to_rfc3339(),
        ],
    )?;

    get_visitor(conn, conn.last_insert_rowid())
}

fn get_visitor(conn: &Connection, id: i64) -> Result<Visitor> {
    let visitor = conn.query_row(
        &format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = ?1"),
        [id],
        visitor_from_row,
    )?;
    Ok(visitor)
}

pub fn get_visitors(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Visitor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VISITOR_COLUMNS} FROM visitors ORDER BY visit_date DESC, id DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let visitors = stmt
        .query_map(params![limit, skip], visitor_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(visitors)
}

pub fn get_resident_visitors(conn: &Connection, resident_id: i64) -> Result<Vec<Visitor>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VISITOR_COLUMNS} FROM visitors WHERE resident_id = ?1 ORDER BY visit_date DESC, id DESC"
    ))?;
    let visitors = stmt
        .query_map([resident_id], visitor_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(visitors)
}

/// Stamp the check-in time. A visitor already checked in keeps the first stamp.
pub fn check_in_visitor(conn: &Connection, id: i64, at: NaiveDateTime) -> Result<Visitor> {
    let changed = conn.execute(
        "UPDATE visitors SET check_in_time = COALESCE(check_in_time, ?1) WHERE id = ?2",
        params![format_datetime(at), id],
    )?;
    if changed == 0 {
        return Err(CareError::not_found("visitor", id));
    }
    get_visitor(conn, id)
}

pub fn check_out_visitor(conn: &Connection, id: i64, at: NaiveDateTime) -> Result<Visitor> {
    let changed = conn.execute(
        "UPDATE visitors SET check_out_time = ?1 WHERE id = ?2",
        params![format_datetime(at), id],
    )?;
    if changed == 0 {
        return Err(CareError::not_found("visitor", id));
    }
    get_visitor(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{admit_test_resident, open_in_memory};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 11).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_visit_lifecycle() {
        let conn = open_in_memory().unwrap();
        let rid = admit_test_resident(&conn, "Ada");
        let mut new_visitor = NewVisitor::new(rid, "Helen", at(14, 0));
        new_visitor.relationship = Some("daughter".to_string());
        let visitor = insert_visitor(&conn, &new_visitor).unwrap();
        assert_eq!(visitor.check_in_time, None);

        let visitor = check_in_visitor(&conn, visitor.id, at(14, 5)).unwrap();
        let visitor = check_in_visitor(&conn, visitor.id, at(14, 30)).unwrap();
        assert_eq!(visitor.check_in_time, Some(at(14, 5)));

        let visitor = check_out_visitor(&conn, visitor.id, at(15, 40)).unwrap();
        assert_eq!(visitor.check_out_time, Some(at(15, 40)));

        assert_eq!(get_resident_visitors(&conn, rid).unwrap().len(), 1);
        assert_eq!(get_visitors(&conn, 0, 10).unwrap().len(), 1);
        assert!(check_in_visitor(&conn, 42, at(9, 0)).unwrap_err().is_not_found());
    }
}
