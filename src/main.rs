use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};

use carehome::entities::bed::{get_beds, insert_bed};
use carehome::entities::checkup::insert_checkup;
use carehome::entities::event::insert_event;
use carehome::entities::resident::{get_residents, insert_resident, search_residents, Resident};
use carehome::{
    assign_bed, check_occupancy, dashboard_stats_with_window, delete_resident, init_logging,
    local_now, local_today, move_resident, open_database, release_bed, todays_birthdays,
    todays_checkups, upcoming_birthdays, upcoming_events, Config, NewBed, NewCheckup, NewEvent,
    NewResident,
};

/// Date-times on the command line, facility-local.
const CLI_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Parser)]
#[command(
    name = "carehome",
    about = "Care home registry: residents, beds, birthdays, checkups and events",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema.
    Init,

    /// Admit a resident.
    Admit {
        name: String,
        gender: String,
        /// YYYY-MM-DD
        date_of_birth: NaiveDate,
        /// YYYY-MM-DD, today when omitted.
        admission_date: Option<NaiveDate>,
    },

    /// List residents in id order.
    Residents,

    /// Find residents by name, room or phone.
    Search { query: String },

    /// Remove a resident that no other record references.
    DeleteResident { resident_id: i64 },

    /// Add a vacant bed.
    AddBed {
        bed_number: String,
        room: String,
        floor: i32,
    },

    /// Schedule a checkup.
    ScheduleCheckup {
        resident_id: i64,
        checkup_type: String,
        /// "YYYY-MM-DD HH:MM"
        #[arg(value_parser = parse_cli_datetime)]
        at: NaiveDateTime,
    },

    /// Plan an event.
    AddEvent {
        title: String,
        /// "YYYY-MM-DD HH:MM"
        #[arg(value_parser = parse_cli_datetime)]
        at: NaiveDateTime,
    },

    /// Headline counts.
    Dashboard,

    /// Birthdays within the window (configured default when omitted).
    Birthdays { days: Option<u32> },

    /// Birthdays falling today.
    BirthdaysToday,

    /// Checkups scheduled for today.
    CheckupsToday,

    /// Upcoming open events (configured default window when omitted).
    Events { days: Option<u32> },

    /// All beds with status.
    Beds,

    /// Put a resident into a vacant bed.
    Assign { bed_id: i64, resident_id: i64 },

    /// Vacate a bed.
    Release { bed_id: i64 },

    /// Transfer a resident to another vacant bed.
    Move { resident_id: i64, bed_id: i64 },

    /// Check occupancy consistency.
    Verify,
}

fn parse_cli_datetime(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, CLI_DATETIME_FORMAT)
        .map_err(|e| format!("{} (expected YYYY-MM-DD HH:MM)", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Init => run_init(&config),
        Commands::Admit {
            name,
            gender,
            date_of_birth,
            admission_date,
        } => {
            let admission_date = admission_date.unwrap_or_else(local_today);
            run_admit(&config, &NewResident::new(&name, &gender, date_of_birth, admission_date))
        }
        Commands::Residents => run_residents(&config, None),
        Commands::Search { query } => run_residents(&config, Some(&query)),
        Commands::DeleteResident { resident_id } => run_delete_resident(&config, resident_id),
        Commands::AddBed {
            bed_number,
            room,
            floor,
        } => run_add_bed(&config, &NewBed::new(&bed_number, &room, floor)),
        Commands::ScheduleCheckup {
            resident_id,
            checkup_type,
            at,
        } => run_schedule_checkup(&config, &NewCheckup::new(resident_id, &checkup_type, at)),
        Commands::AddEvent { title, at } => run_add_event(&config, &NewEvent::new(&title, at)),
        Commands::Dashboard => run_dashboard(&config),
        Commands::Birthdays { days } => {
            run_birthdays(&config, days.unwrap_or(config.birthday_window_days))
        }
        Commands::BirthdaysToday => run_birthdays(&config, 0),
        Commands::CheckupsToday => run_checkups_today(&config),
        Commands::Events { days } => run_events(&config, days.unwrap_or(config.event_window_days)),
        Commands::Beds => run_beds(&config),
        Commands::Assign {
            bed_id,
            resident_id,
        } => run_assign(&config, bed_id, resident_id),
        Commands::Release { bed_id } => run_release(&config, bed_id),
        Commands::Move {
            resident_id,
            bed_id,
        } => run_move(&config, resident_id, bed_id),
        Commands::Verify => run_verify(&config),
    }
}

fn open(config: &Config) -> Result<rusqlite::Connection> {
    open_database(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))
}

fn run_init(config: &Config) -> Result<()> {
    open(config)?;
    println!("✓ Database ready at {}", config.db_path.display());
    Ok(())
}

fn run_admit(config: &Config, resident: &NewResident) -> Result<()> {
    let conn = open(config)?;
    let admitted = insert_resident(&conn, resident).context("failed to admit resident")?;
    println!("✓ Resident {} admitted: {}", admitted.id, admitted.name);
    Ok(())
}

fn print_resident(r: &Resident) {
    println!(
        "{:>4}  {:<30} {}  {:<10} bed {}",
        r.id,
        r.name,
        r.date_of_birth,
        r.status,
        r.bed_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
    );
}

fn run_residents(config: &Config, query: Option<&str>) -> Result<()> {
    let conn = open(config)?;
    let residents = match query {
        Some(q) => search_residents(&conn, q)?,
        None => get_residents(&conn, 0, u32::MAX)?,
    };

    if residents.is_empty() {
        println!("No residents found");
    }
    residents.iter().for_each(print_resident);
    Ok(())
}

fn run_delete_resident(config: &Config, resident_id: i64) -> Result<()> {
    let mut conn = open(config)?;
    delete_resident(&mut conn, resident_id)
        .with_context(|| format!("failed to delete resident {}", resident_id))?;
    println!("✓ Resident {} deleted", resident_id);
    Ok(())
}

fn run_add_bed(config: &Config, bed: &NewBed) -> Result<()> {
    let conn = open(config)?;
    let created = insert_bed(&conn, bed).context("failed to add bed")?;
    println!("✓ Bed {} added: {} in room {}", created.id, created.bed_number, created.room_number);
    Ok(())
}

fn run_schedule_checkup(config: &Config, checkup: &NewCheckup) -> Result<()> {
    let conn = open(config)?;
    let scheduled = insert_checkup(&conn, checkup).context("failed to schedule checkup")?;
    println!(
        "✓ Checkup {} scheduled for resident {} at {}",
        scheduled.id,
        scheduled.resident_id,
        scheduled.scheduled_date.format(CLI_DATETIME_FORMAT)
    );
    Ok(())
}

fn run_add_event(config: &Config, event: &NewEvent) -> Result<()> {
    let conn = open(config)?;
    let created = insert_event(&conn, event).context("failed to add event")?;
    println!(
        "✓ Event {} planned: {} at {}",
        created.id,
        created.title,
        created.event_date.format(CLI_DATETIME_FORMAT)
    );
    Ok(())
}

fn run_dashboard(config: &Config) -> Result<()> {
    let conn = open(config)?;
    let stats = dashboard_stats_with_window(&conn, local_today(), config.birthday_window_days)?;

    println!("📊 Dashboard");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Residents:           {}", stats.total_residents);
    println!("Under medication:    {}", stats.under_medication);
    println!("Vacant beds:         {}", stats.vacant_beds);
    println!("Occupied beds:       {} / {}", stats.occupied_beds, stats.total_beds);
    println!("Occupancy:           {:.1}%", stats.occupancy_rate * 100.0);
    println!(
        "Birthdays ({} days):  {}",
        config.birthday_window_days, stats.upcoming_birthdays
    );
    Ok(())
}

fn run_birthdays(config: &Config, days: u32) -> Result<()> {
    let conn = open(config)?;
    let today = local_today();
    let birthdays = if days == 0 {
        todays_birthdays(&conn, today)?
    } else {
        upcoming_birthdays(&conn, today, days)?
    };

    if birthdays.is_empty() {
        println!("No birthdays in the next {} days", days);
        return Ok(());
    }
    for b in &birthdays {
        println!(
            "{:>4}  {:<30} {}  turns {:>3}  in {} days  room {}",
            b.id,
            b.name,
            b.next_birthday,
            b.turning,
            b.days_until_birthday,
            b.room_number.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_checkups_today(config: &Config) -> Result<()> {
    let conn = open(config)?;
    let checkups = todays_checkups(&conn, local_today())?;

    if checkups.is_empty() {
        println!("No checkups scheduled today");
        return Ok(());
    }
    for c in &checkups {
        println!(
            "{:>4}  {}  resident {:>4}  {:<12} {}",
            c.id,
            c.scheduled_date.format("%H:%M"),
            c.resident_id,
            c.checkup_type,
            c.doctor_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_events(config: &Config, days: u32) -> Result<()> {
    let conn = open(config)?;
    let events = upcoming_events(&conn, local_now(), days)?;

    if events.is_empty() {
        println!("No events in the next {} days", days);
        return Ok(());
    }
    for e in &events {
        println!(
            "{:>4}  {}  {:<30} {}",
            e.id,
            e.event_date.format("%Y-%m-%d %H:%M"),
            e.title,
            e.location.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_beds(config: &Config) -> Result<()> {
    let conn = open(config)?;
    for bed in get_beds(&conn)? {
        println!(
            "{:>4}  bed {:<8} room {:<8} floor {:>2}  {}",
            bed.id, bed.bed_number, bed.room_number, bed.floor, bed.status
        );
    }
    Ok(())
}

fn run_assign(config: &Config, bed_id: i64, resident_id: i64) -> Result<()> {
    let mut conn = open(config)?;
    let assignment = assign_bed(&mut conn, bed_id, resident_id)
        .with_context(|| format!("failed to assign bed {} to resident {}", bed_id, resident_id))?;
    println!(
        "✓ Resident {} assigned to bed {} (room {})",
        assignment.resident_id, assignment.bed_id, assignment.room_number
    );
    Ok(())
}

fn run_release(config: &Config, bed_id: i64) -> Result<()> {
    let mut conn = open(config)?;
    let released = release_bed(&mut conn, bed_id)
        .with_context(|| format!("failed to release bed {}", bed_id))?;
    match released {
        Some(resident_id) => println!("✓ Bed {} released from resident {}", bed_id, resident_id),
        None => println!("✓ Bed {} marked vacant", bed_id),
    }
    Ok(())
}

fn run_move(config: &Config, resident_id: i64, bed_id: i64) -> Result<()> {
    let mut conn = open(config)?;
    let assignment = move_resident(&mut conn, resident_id, bed_id)
        .with_context(|| format!("failed to move resident {} to bed {}", resident_id, bed_id))?;
    match assignment.previous_bed_id {
        Some(previous) => println!(
            "✓ Resident {} moved from bed {} to bed {} (room {})",
            resident_id, previous, assignment.bed_id, assignment.room_number
        ),
        None => println!(
            "✓ Resident {} assigned to bed {} (room {})",
            resident_id, assignment.bed_id, assignment.room_number
        ),
    }
    Ok(())
}

fn run_verify(config: &Config) -> Result<()> {
    let conn = open(config)?;
    let violations = check_occupancy(&conn)?;

    if violations.is_empty() {
        println!("✓ Occupancy consistent");
        return Ok(());
    }
    for v in &violations {
        println!("✗ {:?}", v);
    }
    bail!("{} occupancy violations found", violations.len())
}
