// Monthly billing statements per resident.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::{date_column, enum_column, format_date, timestamp_column};
use crate::error::{CareError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "overdue" => Ok(PaymentStatus::Overdue),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    pub id: i64,
    pub resident_id: i64,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub accommodation_charges: f64,
    pub medical_charges: f64,
    pub food_charges: f64,
    pub other_charges: f64,
    pub total_amount: f64,
    pub amount_paid: f64,
    pub balance: f64,
    pub due_date: NaiveDate,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Charges {
    pub accommodation: f64,
    pub medical: f64,
    pub food: f64,
    pub other: f64,
}

impl Charges {
    pub fn total(&self) -> f64 {
        self.accommodation + self.medical + self.food + self.other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBilling {
    pub resident_id: i64,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub charges: Charges,
    pub amount_paid: f64,
    pub due_date: NaiveDate,
}

const BILLING_COLUMNS: &str = "id, resident_id, billing_period_start, billing_period_end,
    accommodation_charges, medical_charges, food_charges, other_charges, total_amount,
    amount_paid, balance, due_date, payment_status, created_at";

fn billing_from_row(row: &Row<'_>) -> rusqlite::Result<Billing> {
    Ok(Billing {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        billing_period_start: date_column(row, 2)?,
        billing_period_end: date_column(row, 3)?,
        accommodation_charges: row.get(4)?,
        medical_charges: row.get(5)?,
        food_charges: row.get(6)?,
        other_charges: row.get(7)?,
        total_amount: row.get(8)?,
        amount_paid: row.get(9)?,
        balance: row.get(10)?,
        due_date: date_column(row, 11)?,
        payment_status: enum_column(row, 12)?,
        created_at: timestamp_column(row, 13)?,
    })
}

/// Total and balance are derived from the charge components, never supplied.
pub fn insert_billing(conn: &Connection, billing: &NewBilling) -> Result<Billing> {
    if billing.billing_period_end < billing.billing_period_start {
        return Err(CareError::InvalidValue(format!(
            "billing period ends ({}) before it starts ({})",
            billing.billing_period_end, billing.billing_period_start
        )));
    }

    let total = billing.charges.total();
    let balance = total - billing.amount_paid;
    let status = if balance <= 0.0 {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Pending
    };

    conn.execute(
        "INSERT INTO billing (
            resident_id, billing_period_start, billing_period_end, accommodation_charges,
            medical_charges, food_charges, other_charges, total_amount, amount_paid, balance,
            due_date, payment_status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            billing.resident_id,
            format_date(billing.billing_period_start),
            format_date(billing.billing_period_end),
            billing.charges.accommodation,
            billing.charges.medical,
            billing.charges.food,
            billing.charges.other,
            total,
            billing.amount_paid,
            balance,
            format_date(billing.due_date),
            status.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    let billing = conn.query_row(
        &format!("SELECT {BILLING_COLUMNS} FROM billing WHERE id = ?1"),
        [id],
        billing_from_row,
    )?;
    Ok(billing)
}

pub fn get_billing(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Billing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BILLING_COLUMNS} FROM billing ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt
        .query_map(params![limit, skip], billing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_resident_billing(conn: &Connection, resident_id: i64) -> Result<Vec<Billing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BILLING_COLUMNS} FROM billing WHERE resident_id = ?1 ORDER BY billing_period_start"
    ))?;
    let rows = stmt
        .query_map([resident_id], billing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Flag pending statements whose due date is before `today`. Returns how many changed.
pub fn mark_overdue(conn: &Connection, today: NaiveDate) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE billing SET payment_status = ?1
         WHERE payment_status = ?2 AND due_date < ?3",
        params![
            PaymentStatus::Overdue.as_str(),
            PaymentStatus::Pending.as_str(),
            format_date(today),
        ],
    )?;
    Ok(changed)
}
