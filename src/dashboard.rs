// Dashboard aggregates, read from one snapshot.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::entities::bed::{count_beds, count_beds_by_status, BedStatus};
use crate::entities::medication::count_residents_under_medication;
use crate::entities::resident::{count_residents_by_status, ResidentStatus};
use crate::error::Result;
use crate::temporal::upcoming_birthdays_count;

/// Days ahead the dashboard looks for birthdays.
pub const DASHBOARD_BIRTHDAY_WINDOW: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Active residents.
    pub total_residents: i64,
    /// Active residents with at least one active medication.
    pub under_medication: i64,
    pub vacant_beds: i64,
    pub upcoming_birthdays: usize,
    pub total_beds: i64,
    pub occupied_beds: i64,
    /// Occupied share of all beds, 0.0 when there are no beds.
    pub occupancy_rate: f64,
}

pub fn dashboard_stats(conn: &Connection, today: NaiveDate) -> Result<DashboardStats> {
    dashboard_stats_with_window(conn, today, DASHBOARD_BIRTHDAY_WINDOW)
}

pub fn dashboard_stats_with_window(
    conn: &Connection,
    today: NaiveDate,
    birthday_window_days: u32,
) -> Result<DashboardStats> {
    // Read-only; dropping the transaction at the end just ends the snapshot
    let snapshot = conn.unchecked_transaction()?;

    let total_beds = count_beds(&snapshot)?;
    let occupied_beds = count_beds_by_status(&snapshot, BedStatus::Occupied)?;
    let occupancy_rate = if total_beds == 0 {
        0.0
    } else {
        occupied_beds as f64 / total_beds as f64
    };

    let stats = DashboardStats {
        total_residents: count_residents_by_status(&snapshot, ResidentStatus::Active)?,
        under_medication: count_residents_under_medication(&snapshot)?,
        vacant_beds: count_beds_by_status(&snapshot, BedStatus::Vacant)?,
        upcoming_birthdays: upcoming_birthdays_count(&snapshot, today, birthday_window_days)?,
        total_beds,
        occupied_beds,
        occupancy_rate,
    };

    tracing::debug!(?stats, "dashboard stats");
    Ok(stats)
}
