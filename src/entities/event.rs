// Facility events (activities, birthdays, medical visits, outings).

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{datetime_column, enum_column, format_datetime, timestamp_column, whole_seconds};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Planned => "planned",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    /// Planned and ongoing events still appear on schedules.
    pub fn is_open(&self) -> bool {
        matches!(self, EventStatus::Planned | EventStatus::Ongoing)
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "planned" => Ok(EventStatus::Planned),
            "ongoing" => Ok(EventStatus::Ongoing),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub event_date: NaiveDateTime,
    pub duration_minutes: Option<i32>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub max_participants: Option<i32>,
    pub current_participants: i32,
    pub status: EventStatus,
    /// birthday, activity, medical, social
    pub event_type: Option<String>,
    pub is_recurring: bool,
    /// weekly, monthly, ...
    pub recurrence_pattern: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_date: NaiveDateTime,
    pub duration_minutes: Option<i32>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub status: EventStatus,
    pub event_type: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
}

impl NewEvent {
    /// `event_date` is kept to the second.
    pub fn new(title: &str, event_date: NaiveDateTime) -> Self {
        NewEvent {
            title: title.to_string(),
            description: None,
            event_date: whole_seconds(event_date),
            duration_minutes: None,
            location: None,
            organizer: None,
            max_participants: None,
            status: EventStatus::Planned,
            event_type: None,
            is_recurring: false,
            recurrence_pattern: None,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }
}

const EVENT_COLUMNS: &str = "id, title, description, event_date, duration_minutes, location,
    organizer, max_participants, current_participants, status, event_type, is_recurring,
    recurrence_pattern, created_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        event_date: datetime_column(row, 3)?,
        duration_minutes: row.get(4)?,
        location: row.get(5)?,
        organizer: row.get(6)?,
        max_participants: row.get(7)?,
        current_participants: row.get(8)?,
        status: enum_column(row, 9)?,
        event_type: row.get(10)?,
        is_recurring: row.get(11)?,
        recurrence_pattern: row.get(12)?,
        created_at: timestamp_column(row, 13)?,
    })
}

pub fn insert_event(conn: &Connection, event: &NewEvent) -> Result<Event> {
    conn.execute(
        "INSERT INTO events (
            title, description, event_date, duration_minutes, location, organizer,
            max_participants, status, event_type, is_recurring, recurrence_pattern, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            event.title,
            event.description,
            format_datetime(event.event_date),
            event.duration_minutes,
            event.location,
            event.organizer,
            event.max_participants,
            event.status.as_str(),
            event.event_type,
            event.is_recurring,
            event.recurrence_pattern,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_event(conn, id)?.ok_or_else(|| CareError::not_found("event", id))
}

pub fn get_event(conn: &Connection, id: i64) -> Result<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            [id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

pub fn get_events(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let events = stmt
        .query_map(params![limit, skip], event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

/// Events whose status is one of `statuses`, in store order.
pub fn get_events_by_status(conn: &Connection, statuses: &[EventStatus]) -> Result<Vec<Event>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; statuses.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE status IN ({placeholders}) ORDER BY id"
    ))?;
    let events = stmt
        .query_map(params_from_iter(statuses.iter().map(|s| s.as_str())), event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

pub fn set_event_status(conn: &Connection, id: i64, status: EventStatus) -> Result<()> {
    let changed = conn.execute(
        "UPDATE events SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    if changed == 0 {
        return Err(CareError::not_found("event", id));
    }
    Ok(())
}
