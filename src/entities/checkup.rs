use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{
    datetime_column, enum_column, format_date, format_datetime, opt_date_column, timestamp_column,
    whole_seconds,
};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckupStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl CheckupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckupStatus::Scheduled => "scheduled",
            CheckupStatus::Completed => "completed",
            CheckupStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for CheckupStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(CheckupStatus::Scheduled),
            "completed" => Ok(CheckupStatus::Completed),
            "cancelled" => Ok(CheckupStatus::Cancelled),
            other => Err(format!("unknown checkup status: {other}")),
        }
    }
}

impl fmt::Display for CheckupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkup {
    pub id: i64,
    pub resident_id: i64,
    /// routine, emergency, specialist
    pub checkup_type: String,
    pub scheduled_date: NaiveDateTime,
    pub doctor_name: Option<String>,
    /// clinic, hospital, on-site
    pub location: Option<String>,
    pub status: CheckupStatus,
    pub notes: Option<String>,
    pub results: Option<String>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCheckup {
    pub resident_id: i64,
    pub checkup_type: String,
    pub scheduled_date: NaiveDateTime,
    pub doctor_name: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: CheckupStatus,
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
}

impl NewCheckup {
    pub fn new(resident_id: i64, checkup_type: &str, scheduled_date: NaiveDateTime) -> Self {
        NewCheckup {
            resident_id,
            checkup_type: checkup_type.to_string(),
            scheduled_date: whole_seconds(scheduled_date),
            doctor_name: None,
            location: None,
            status: CheckupStatus::Scheduled,
            notes: None,
            follow_up_required: false,
            follow_up_date: None,
        }
    }

    pub fn with_status(mut self, status: CheckupStatus) -> Self {
        self.status = status;
        self
    }
}

const CHECKUP_COLUMNS: &str = "id, resident_id, checkup_type, scheduled_date, doctor_name,
    location, status, notes, results, follow_up_required, follow_up_date, created_at";

fn checkup_from_row(row: &Row<'_>) -> rusqlite::Result<Checkup> {
    Ok(Checkup {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        checkup_type: row.get(2)?,
        scheduled_date: datetime_column(row, 3)?,
        doctor_name: row.get(4)?,
        location: row.get(5)?,
        status: enum_column(row, 6)?,
        notes: row.get(7)?,
        results: row.get(8)?,
        follow_up_required: row.get(9)?,
        follow_up_date: opt_date_column(row, 10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

fn query_checkups<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Checkup>> {
    let mut stmt = conn.prepare(sql)?;
    let checkups = stmt
        .query_map(params, checkup_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(checkups)
}

pub fn insert_checkup(conn: &Connection, checkup: &NewCheckup) -> Result<Checkup> {
    conn.execute(
        "INSERT INTO checkups (
            resident_id, checkup_type, scheduled_date, doctor_name, location, status,
            notes, follow_up_required, follow_up_date, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            checkup.resident_id,
            checkup.checkup_type,
            format_datetime(checkup.scheduled_date),
            checkup.doctor_name,
            checkup.location,
            checkup.status.as_str(),
            checkup.notes,
            checkup.follow_up_required,
            checkup.follow_up_date.map(format_date),
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_checkup(conn, id)?.ok_or_else(|| CareError::not_found("checkup", id))
}

pub fn get_checkup(conn: &Connection, id: i64) -> Result<Option<Checkup>> {
    let checkup = conn
        .query_row(
            &format!("SELECT {CHECKUP_COLUMNS} FROM checkups WHERE id = ?1"),
            [id],
            checkup_from_row,
        )
        .optional()?;
    Ok(checkup)
}

pub fn get_checkups(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Checkup>> {
    query_checkups(
        conn,
        &format!("SELECT {CHECKUP_COLUMNS} FROM checkups ORDER BY id LIMIT ?1 OFFSET ?2"),
        params![limit, skip],
    )
}

pub fn get_checkups_by_status(conn: &Connection, status: CheckupStatus) -> Result<Vec<Checkup>> {
    query_checkups(
        conn,
        &format!(
            "SELECT {CHECKUP_COLUMNS} FROM checkups WHERE status = ?1 ORDER BY scheduled_date, id"
        ),
        [status.as_str()],
    )
}

pub fn get_resident_checkups(conn: &Connection, resident_id: i64) -> Result<Vec<Checkup>> {
    query_checkups(
        conn,
        &format!(
            "SELECT {CHECKUP_COLUMNS} FROM checkups WHERE resident_id = ?1 ORDER BY scheduled_date, id"
        ),
        [resident_id],
    )
}

/// Record the outcome of a checkup (completed with results, or cancelled).
pub fn close_checkup(
    conn: &Connection,
    id: i64,
    status: CheckupStatus,
    results: Option<&str>,
) -> Result<Checkup> {
    let changed = conn.execute(
        "UPDATE checkups SET status = ?1, results = COALESCE(?2, results) WHERE id = ?3",
        params![status.as_str(), results, id],
    )?;
    if changed == 0 {
        return Err(CareError::not_found("checkup", id));
    }
    get_checkup(conn, id)?.ok_or_else(|| CareError::not_found("checkup", id))
}
