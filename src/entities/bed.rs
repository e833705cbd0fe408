// Bed records. Status transitions between Vacant and Occupied belong to the
// occupancy module; Maintenance is set by staff through set_bed_maintenance.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{enum_column, opt_timestamp_column, timestamp_column};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedStatus {
    Vacant,
    Occupied,
    Maintenance,
}

impl BedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedStatus::Vacant => "vacant",
            BedStatus::Occupied => "occupied",
            BedStatus::Maintenance => "maintenance",
        }
    }
}

impl FromStr for BedStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "vacant" => Ok(BedStatus::Vacant),
            "occupied" => Ok(BedStatus::Occupied),
            "maintenance" => Ok(BedStatus::Maintenance),
            other => Err(format!("unknown bed status: {other}")),
        }
    }
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub id: i64,
    pub bed_number: String,
    pub room_number: String,
    pub floor: i32,
    /// single, shared, ...
    pub bed_type: Option<String>,
    pub status: BedStatus,
    pub monthly_rate: Option<f64>,
    pub amenities: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bed {
    pub fn is_vacant(&self) -> bool {
        self.status == BedStatus::Vacant
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBed {
    pub bed_number: String,
    pub room_number: String,
    pub floor: i32,
    pub bed_type: Option<String>,
    pub monthly_rate: Option<f64>,
    pub amenities: Option<String>,
}

impl NewBed {
    pub fn new(bed_number: &str, room_number: &str, floor: i32) -> Self {
        NewBed {
            bed_number: bed_number.to_string(),
            room_number: room_number.to_string(),
            floor,
            bed_type: None,
            monthly_rate: None,
            amenities: None,
        }
    }
}

const BED_COLUMNS: &str =
    "id, bed_number, room_number, floor, bed_type, status, monthly_rate, amenities, created_at, updated_at";

fn bed_from_row(row: &Row<'_>) -> rusqlite::Result<Bed> {
    Ok(Bed {
        id: row.get(0)?,
        bed_number: row.get(1)?,
        room_number: row.get(2)?,
        floor: row.get(3)?,
        bed_type: row.get(4)?,
        status: enum_column(row, 5)?,
        monthly_rate: row.get(6)?,
        amenities: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: opt_timestamp_column(row, 9)?,
    })
}

/// New beds always start vacant.
pub fn insert_bed(conn: &Connection, bed: &NewBed) -> Result<Bed> {
    conn.execute(
        "INSERT INTO beds (bed_number, room_number, floor, bed_type, status, monthly_rate, amenities, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            bed.bed_number,
            bed.room_number,
            bed.floor,
            bed.bed_type,
            BedStatus::Vacant.as_str(),
            bed.monthly_rate,
            bed.amenities,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_bed(conn, id)?.ok_or_else(|| CareError::not_found("bed", id))
}

pub fn get_bed(conn: &Connection, id: i64) -> Result<Option<Bed>> {
    let bed = conn
        .query_row(
            &format!("SELECT {BED_COLUMNS} FROM beds WHERE id = ?1"),
            [id],
            bed_from_row,
        )
        .optional()?;
    Ok(bed)
}

pub fn get_beds(conn: &Connection) -> Result<Vec<Bed>> {
    let mut stmt = conn.prepare(&format!("SELECT {BED_COLUMNS} FROM beds ORDER BY id"))?;
    let beds = stmt
        .query_map([], bed_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(beds)
}

pub fn get_beds_by_status(conn: &Connection, status: BedStatus) -> Result<Vec<Bed>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BED_COLUMNS} FROM beds WHERE status = ?1 ORDER BY id"
    ))?;
    let beds = stmt
        .query_map([status.as_str()], bed_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(beds)
}

pub fn get_vacant_beds(conn: &Connection) -> Result<Vec<Bed>> {
    get_beds_by_status(conn, BedStatus::Vacant)
}

pub fn count_beds_by_status(conn: &Connection, status: BedStatus) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM beds WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_beds(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM beds", [], |row| row.get(0))?;
    Ok(count)
}

/// Take a vacant bed out of service, or return a maintenance bed to service.
///
/// Occupied beds are refused: a bed can only leave Occupied through a release.
pub fn set_bed_maintenance(conn: &Connection, id: i64, under_maintenance: bool) -> Result<Bed> {
    let bed = get_bed(conn, id)?.ok_or_else(|| CareError::not_found("bed", id))?;
    if bed.status == BedStatus::Occupied {
        return Err(CareError::BedNotVacant {
            bed_id: id,
            status: bed.status.to_string(),
        });
    }

    let status = if under_maintenance {
        BedStatus::Maintenance
    } else {
        BedStatus::Vacant
    };
    conn.execute(
        "UPDATE beds SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), Utc::now().to_rfc3339(), id],
    )?;

    get_bed(conn, id)?.ok_or_else(|| CareError::not_found("bed", id))
}
