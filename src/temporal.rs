// ⏰ Temporal queries - "relative to now" facts
//
// Everything here takes the reference day or instant from the caller. The
// binaries pass local wall-clock time; tests pass fixed dates.
//
// Birthday rule: the anniversary in a given year is the birth date with the
// year replaced. A Feb 29 birth date falls on Feb 28 in non-leap years.
//
// Each query has a pure form over a slice (birthdays_within, checkups_on,
// events_within) and a store-backed form that loads candidates and delegates
// to it. The date predicate exists exactly once per query.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::whole_seconds;
use crate::entities::checkup::{get_checkups_by_status, Checkup, CheckupStatus};
use crate::entities::event::{get_events_by_status, Event, EventStatus};
use crate::entities::resident::{get_residents_by_status, Resident, ResidentStatus};
use crate::error::Result;

/// Today's date in the facility's local time zone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// The current local wall-clock instant, to the second like stored times.
pub fn local_now() -> NaiveDateTime {
    whole_seconds(Local::now().naive_local())
}

// ============================================================================
// BIRTHDAYS
// ============================================================================

/// The anniversary of `date_of_birth` in `year`.
///
/// Feb 29 maps to Feb 28 when `year` is not a leap year. Years outside
/// chrono's range saturate to `NaiveDate::MAX`.
pub fn anniversary_in(date_of_birth: NaiveDate, year: i32) -> NaiveDate {
    date_of_birth
        .with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(NaiveDate::MAX)
}

/// Date of the next anniversary on or after `today`.
pub fn next_birthday(date_of_birth: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = anniversary_in(date_of_birth, today.year());
    if this_year < today {
        anniversary_in(date_of_birth, today.year() + 1)
    } else {
        this_year
    }
}

/// Whole days from `today` until the next anniversary. Always in `0..=366`.
pub fn next_birthday_distance(date_of_birth: NaiveDate, today: NaiveDate) -> i64 {
    (next_birthday(date_of_birth, today) - today).num_days()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentBirthday {
    pub id: i64,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub room_number: Option<String>,
    pub next_birthday: NaiveDate,
    /// Age reached on `next_birthday`.
    pub turning: i32,
    pub days_until_birthday: i64,
}

impl ResidentBirthday {
    fn for_resident(resident: &Resident, today: NaiveDate) -> Self {
        let next = next_birthday(resident.date_of_birth, today);
        ResidentBirthday {
            id: resident.id,
            name: resident.name.clone(),
            date_of_birth: resident.date_of_birth,
            room_number: resident.room_number.clone(),
            next_birthday: next,
            turning: next.year() - resident.date_of_birth.year(),
            days_until_birthday: (next - today).num_days(),
        }
    }
}

/// Active residents whose next birthday is within `window_days` of `today`
/// (inclusive), nearest first.
///
/// The sort is stable: residents with the same distance keep their input
/// order. It is not a name order.
pub fn birthdays_within(residents: &[Resident], today: NaiveDate, window_days: u32) -> Vec<ResidentBirthday> {
    let window = i64::from(window_days);

    let mut upcoming: Vec<ResidentBirthday> = residents
        .iter()
        .filter(|r| r.is_active())
        .map(|r| ResidentBirthday::for_resident(r, today))
        .filter(|b| (0..=window).contains(&b.days_until_birthday))
        .collect();

    upcoming.sort_by_key(|b| b.days_until_birthday);
    upcoming
}

/// Upcoming birthdays of active residents, read from the store in id order.
pub fn upcoming_birthdays(conn: &Connection, today: NaiveDate, window_days: u32) -> Result<Vec<ResidentBirthday>> {
    let residents = get_residents_by_status(conn, ResidentStatus::Active)?;
    let upcoming = birthdays_within(&residents, today, window_days);

    tracing::debug!(
        %today,
        window_days,
        candidates = residents.len(),
        matched = upcoming.len(),
        "upcoming birthdays"
    );
    Ok(upcoming)
}

/// Always equal to `upcoming_birthdays(..).len()`; it is computed from it.
pub fn upcoming_birthdays_count(conn: &Connection, today: NaiveDate, window_days: u32) -> Result<usize> {
    Ok(upcoming_birthdays(conn, today, window_days)?.len())
}

pub fn todays_birthdays(conn: &Connection, today: NaiveDate) -> Result<Vec<ResidentBirthday>> {
    upcoming_birthdays(conn, today, 0)
}

// ============================================================================
// CHECKUPS
// ============================================================================

/// Scheduled checkups falling on `day`, whatever the time of day.
pub fn checkups_on(checkups: &[Checkup], day: NaiveDate) -> Vec<Checkup> {
    checkups
        .iter()
        .filter(|c| c.status == CheckupStatus::Scheduled && c.scheduled_date.date() == day)
        .cloned()
        .collect()
}

pub fn todays_checkups(conn: &Connection, today: NaiveDate) -> Result<Vec<Checkup>> {
    let scheduled = get_checkups_by_status(conn, CheckupStatus::Scheduled)?;
    let todays = checkups_on(&scheduled, today);

    tracing::debug!(%today, count = todays.len(), "today's checkups");
    Ok(todays)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Planned or ongoing events in `[now, now + window_days]`, both ends
/// inclusive, earliest first. `now` is compared at second precision.
pub fn events_within(events: &[Event], now: NaiveDateTime, window_days: u32) -> Vec<Event> {
    let now = whole_seconds(now);
    let until = now
        .checked_add_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(NaiveDateTime::MAX);

    let mut upcoming: Vec<Event> = events
        .iter()
        .filter(|e| e.status.is_open() && e.event_date >= now && e.event_date <= until)
        .cloned()
        .collect();

    upcoming.sort_by_key(|e| e.event_date);
    upcoming
}

pub fn upcoming_events(conn: &Connection, now: NaiveDateTime, window_days: u32) -> Result<Vec<Event>> {
    let open = get_events_by_status(conn, &[EventStatus::Planned, EventStatus::Ongoing])?;
    let upcoming = events_within(&open, now, window_days);

    tracing::debug!(%now, window_days, count = upcoming.len(), "upcoming events");
    Ok(upcoming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::entities::checkup::{insert_checkup, NewCheckup};
    use crate::entities::event::{insert_event, NewEvent};
    use crate::entities::resident::{insert_resident, NewResident};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    fn admit(conn: &Connection, name: &str, dob: NaiveDate) -> i64 {
        insert_resident(conn, &NewResident::new(name, "Female", dob, date(2020, 1, 1)))
            .unwrap()
            .id
    }

    /// Walk forward one day at a time until the month/day matches.
    fn distance_by_walking(dob: NaiveDate, today: NaiveDate) -> i64 {
        let mut day = today;
        for k in 0..=400 {
            let leap_stand_in = dob.month() == 2
                && dob.day() == 29
                && day.month() == 2
                && day.day() == 28
                && NaiveDate::from_ymd_opt(day.year(), 2, 29).is_none();
            if (day.month() == dob.month() && day.day() == dob.day()) || leap_stand_in {
                return k;
            }
            day = day.succ_opt().unwrap();
        }
        panic!("no anniversary within 400 days of {today} for {dob}");
    }

    // ------------------------------------------------------------------------
    // Pure date math
    // ------------------------------------------------------------------------

    #[test]
    fn test_anniversary_feb_29_collapses_to_feb_28() {
        let leapling = date(1944, 2, 29);
        assert_eq!(anniversary_in(leapling, 2023), date(2023, 2, 28));
        assert_eq!(anniversary_in(leapling, 2024), date(2024, 2, 29));
        assert_eq!(anniversary_in(leapling, 2100), date(2100, 2, 28));
        assert_eq!(anniversary_in(date(1950, 7, 4), 2023), date(2023, 7, 4));
    }

    #[test]
    fn test_distance_same_day_and_passed() {
        let dob = date(1950, 6, 15);
        assert_eq!(next_birthday_distance(dob, date(2024, 6, 15)), 0);
        assert_eq!(next_birthday_distance(dob, date(2024, 6, 14)), 1);
        // Passed yesterday: a full year away, 2025 is not a leap year
        assert_eq!(next_birthday_distance(dob, date(2024, 6, 16)), 364);
    }

    #[test]
    fn test_distance_wraps_year_end() {
        assert_eq!(next_birthday_distance(date(1940, 1, 3), date(2024, 12, 30)), 4);
        assert_eq!(next_birthday_distance(date(1940, 1, 1), date(2024, 12, 31)), 1);
        assert_eq!(next_birthday_distance(date(1940, 12, 31), date(2025, 1, 1)), 364);
    }

    #[test]
    fn test_distance_leap_birthday_across_years() {
        let leapling = date(1944, 2, 29);
        // Non-leap year: Feb 28 is the birthday
        assert_eq!(next_birthday_distance(leapling, date(2023, 2, 28)), 0);
        assert_eq!(next_birthday_distance(leapling, date(2023, 2, 27)), 1);
        // Day after the stand-in: wait for the real Feb 29 of 2024
        assert_eq!(next_birthday_distance(leapling, date(2023, 3, 1)), 365);
        // Leap year: Feb 28 is the eve
        assert_eq!(next_birthday_distance(leapling, date(2024, 2, 28)), 1);
        assert_eq!(next_birthday_distance(leapling, date(2024, 2, 29)), 0);
        // Next one is Feb 28 2025
        assert_eq!(next_birthday_distance(leapling, date(2024, 3, 1)), 364);
    }

    #[test]
    fn test_distance_matches_day_walk_and_stays_bounded() {
        let births = [
            date(1944, 2, 29),
            date(1939, 2, 28),
            date(1941, 3, 1),
            date(1938, 1, 1),
            date(1945, 12, 31),
            date(1947, 7, 19),
        ];

        let mut today = date(2023, 1, 1);
        while today <= date(2025, 12, 31) {
            for dob in births {
                let distance = next_birthday_distance(dob, today);
                assert!((0..=366).contains(&distance), "{dob} from {today}: {distance}");
                assert_eq!(distance, distance_by_walking(dob, today), "{dob} from {today}");
            }
            today = today.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_birthdays_within_is_stable_not_alphabetical() {
        let conn = open_in_memory().unwrap();
        admit(&conn, "Zelda", date(1940, 5, 3));
        admit(&conn, "Abe", date(1941, 5, 3));
        admit(&conn, "Mona", date(1942, 5, 1));
        admit(&conn, "Far Away", date(1942, 9, 1));

        let residents = get_residents_by_status(&conn, ResidentStatus::Active).unwrap();
        let upcoming = birthdays_within(&residents, date(2024, 5, 1), 7);

        let names: Vec<&str> = upcoming.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Mona", "Zelda", "Abe"]);
        assert_eq!(upcoming[0].days_until_birthday, 0);
        assert_eq!(upcoming[1].days_until_birthday, 2);
        assert_eq!(upcoming[1].turning, 84);
        assert_eq!(upcoming[1].next_birthday, date(2024, 5, 3));
    }

    // ------------------------------------------------------------------------
    // Store-backed birthday queries
    // ------------------------------------------------------------------------

    fn seed_birthdays(conn: &Connection) {
        for (i, (m, d)) in [
            (1, 1),
            (1, 3),
            (1, 10),
            (2, 28),
            (3, 1),
            (6, 30),
            (7, 1),
            (12, 24),
            (12, 29),
            (12, 31),
        ]
        .into_iter()
        .enumerate()
        {
            admit(conn, &format!("Resident {i}"), date(1935 + i as i32, m, d));
        }
        admit(conn, "Leapling", date(1944, 2, 29));
        insert_resident(
            conn,
            &NewResident::new("Discharged", "Male", date(1940, 12, 30), date(2020, 1, 1))
                .with_status(ResidentStatus::Discharged),
        )
        .unwrap();
    }

    #[test]
    fn test_year_end_window_includes_january() {
        let conn = open_in_memory().unwrap();
        seed_birthdays(&conn);

        let upcoming = upcoming_birthdays(&conn, date(2024, 12, 30), 10).unwrap();
        let found: Vec<(NaiveDate, i64)> = upcoming
            .iter()
            .map(|b| (b.next_birthday, b.days_until_birthday))
            .collect();

        assert_eq!(
            found,
            vec![
                (date(2024, 12, 31), 1),
                (date(2025, 1, 1), 2),
                (date(2025, 1, 3), 4),
            ]
        );
        // Discharged resident born Dec 30 is excluded
        assert!(upcoming.iter().all(|b| b.name != "Discharged"));

        // Jan 10 is 11 days out
        assert_eq!(upcoming_birthdays_count(&conn, date(2024, 12, 30), 11).unwrap(), 4);
    }

    #[test]
    fn test_count_equals_list_length() {
        let conn = open_in_memory().unwrap();
        seed_birthdays(&conn);

        for today in [
            date(2024, 12, 29),
            date(2024, 12, 30),
            date(2023, 2, 28),
            date(2024, 2, 28),
            date(2024, 6, 30),
        ] {
            for window in 0..=400 {
                let list = upcoming_birthdays(&conn, today, window).unwrap();
                let count = upcoming_birthdays_count(&conn, today, window).unwrap();
                assert_eq!(count, list.len(), "today {today}, window {window}");
            }
            // A window of a full year or more sees every active resident
            assert_eq!(upcoming_birthdays_count(&conn, today, 366).unwrap(), 11);
        }
    }

    #[test]
    fn test_todays_birthdays() {
        let conn = open_in_memory().unwrap();
        seed_birthdays(&conn);

        for today in [date(2025, 1, 1), date(2023, 2, 28), date(2024, 2, 29), date(2024, 4, 4)] {
            assert_eq!(
                todays_birthdays(&conn, today).unwrap(),
                upcoming_birthdays(&conn, today, 0).unwrap()
            );
        }

        // Non-leap Feb 28: the Feb 28 resident and the leapling
        let feb_28 = todays_birthdays(&conn, date(2023, 2, 28)).unwrap();
        let names: Vec<&str> = feb_28.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Resident 3", "Leapling"]);

        // Leap year: only the leapling on Feb 29
        let feb_29 = todays_birthdays(&conn, date(2024, 2, 29)).unwrap();
        assert_eq!(feb_29.len(), 1);
        assert_eq!(feb_29[0].name, "Leapling");
        assert_eq!(feb_29[0].turning, 80);

        assert!(todays_birthdays(&conn, date(2024, 4, 4)).unwrap().is_empty());
    }

    // ------------------------------------------------------------------------
    // Checkups and events
    // ------------------------------------------------------------------------

    #[test]
    fn test_todays_checkups_ignore_time_and_status() {
        let conn = open_in_memory().unwrap();
        let rid = admit(&conn, "Patient", date(1940, 1, 1));

        insert_checkup(&conn, &NewCheckup::new(rid, "routine", at(2024, 3, 5, 0, 0))).unwrap();
        insert_checkup(&conn, &NewCheckup::new(rid, "specialist", at(2024, 3, 5, 23, 59))).unwrap();
        insert_checkup(&conn, &NewCheckup::new(rid, "routine", at(2024, 3, 6, 0, 0))).unwrap();
        insert_checkup(&conn, &NewCheckup::new(rid, "routine", at(2024, 3, 4, 23, 59))).unwrap();
        insert_checkup(
            &conn,
            &NewCheckup::new(rid, "emergency", at(2024, 3, 5, 12, 0)).with_status(CheckupStatus::Cancelled),
        )
        .unwrap();
        insert_checkup(
            &conn,
            &NewCheckup::new(rid, "routine", at(2024, 3, 5, 8, 0)).with_status(CheckupStatus::Completed),
        )
        .unwrap();

        let today = todays_checkups(&conn, date(2024, 3, 5)).unwrap();
        let types: Vec<&str> = today.iter().map(|c| c.checkup_type.as_str()).collect();
        assert_eq!(types, vec!["routine", "specialist"]);
        assert!(today.iter().all(|c| c.scheduled_date.date() == date(2024, 3, 5)));
    }

    #[test]
    fn test_upcoming_events_window_and_order() {
        let conn = open_in_memory().unwrap();
        let now = at(2024, 12, 28, 10, 0);

        insert_event(&conn, &NewEvent::new("New Year party", at(2024, 12, 31, 20, 0))).unwrap();
        insert_event(&conn, &NewEvent::new("Exactly now", now)).unwrap();
        insert_event(&conn, &NewEvent::new("Window edge", at(2025, 1, 4, 10, 0))).unwrap();
        insert_event(&conn, &NewEvent::new("Just past edge", at(2025, 1, 4, 10, 1))).unwrap();
        insert_event(&conn, &NewEvent::new("Earlier today", at(2024, 12, 28, 9, 59))).unwrap();
        insert_event(
            &conn,
            &NewEvent::new("Choir", at(2024, 12, 29, 11, 0)).with_status(EventStatus::Ongoing),
        )
        .unwrap();
        insert_event(
            &conn,
            &NewEvent::new("Cancelled bingo", at(2024, 12, 29, 9, 0)).with_status(EventStatus::Cancelled),
        )
        .unwrap();
        insert_event(
            &conn,
            &NewEvent::new("Done quiz", at(2024, 12, 30, 9, 0)).with_status(EventStatus::Completed),
        )
        .unwrap();

        let upcoming = upcoming_events(&conn, now, 7).unwrap();
        let titles: Vec<&str> = upcoming.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Exactly now", "Choir", "New Year party", "Window edge"]);

        assert!(upcoming.windows(2).all(|w| w[0].event_date <= w[1].event_date));
        assert!(upcoming.iter().all(|e| e.status.is_open()));
    }

    #[test]
    fn test_event_created_now_is_upcoming() {
        let conn = open_in_memory().unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 12, 28)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 500)
            .unwrap();

        let new_event = NewEvent::new("Tea", now);
        let stored = insert_event(&conn, &new_event).unwrap();
        assert_eq!(stored.event_date, new_event.event_date);
        assert_eq!(stored.event_date, at(2024, 12, 28, 10, 0));

        let upcoming = upcoming_events(&conn, now, 0).unwrap();
        assert_eq!(upcoming, vec![stored]);
    }

    #[test]
    fn test_events_within_zero_window_and_huge_window() {
        let conn = open_in_memory().unwrap();
        let now = at(2024, 1, 1, 9, 0);
        insert_event(&conn, &NewEvent::new("Now", now)).unwrap();
        insert_event(&conn, &NewEvent::new("Later", at(2030, 1, 1, 9, 0))).unwrap();

        let open = get_events_by_status(&conn, &[EventStatus::Planned]).unwrap();
        assert_eq!(events_within(&open, now, 0).len(), 1);
        assert_eq!(events_within(&open, now, u32::MAX).len(), 2);
    }
}
