// Care Home Registry - Core Library
// Exposes the store, the temporal queries and the occupancy transitions for
// the CLI, the API server and the tests

pub mod config;
pub mod dashboard;
pub mod db;
pub mod entities;
pub mod error;
pub mod occupancy;
pub mod temporal;

// Re-export commonly used types
pub use config::Config;
pub use dashboard::{dashboard_stats, dashboard_stats_with_window, DashboardStats};
pub use db::{
    get_audit_entries, insert_audit_entry, open_database, open_in_memory, setup_database,
    AuditEntry,
};
pub use entities::{
    Bed, BedStatus, Billing, Checkup, CheckupStatus, Document, Event, EventStatus, Medication,
    NewBed, NewCheckup, NewEvent, NewMedication, NewResident, Resident, ResidentStatus,
    ResidentUpdate, Staff, Visitor,
};
pub use error::{CareError, Result};
pub use occupancy::{
    assign_bed, check_occupancy, delete_resident, move_resident, release_bed, BedAssignment,
    OccupancyViolation,
};
pub use temporal::{
    local_now, local_today, next_birthday_distance, todays_birthdays, todays_checkups,
    upcoming_birthdays, upcoming_birthdays_count, upcoming_events, ResidentBirthday,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by the binaries. `RUST_LOG` overrides
/// the default `info` level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
