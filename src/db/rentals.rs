// src/db/rentals.rs
//
// Rentals loop items out and back: one active rental per item, ended with a
// disposition that decides whether the item returns to stock or leaves as
// disposed. An active reservation is consumed by the start, in the same
// transaction.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::db::{contacts, items, reservations};
use crate::domain::party::PartyRef;
use crate::domain::status::{EndDisposition, ItemStatus, RentalStatus};
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct RentalRow {
    pub id: i64,
    pub item_id: i64,
    pub customer_id: i64,
    pub price_cents: i64,
    pub deposit_cents: Option<i64>,
    pub start_date: NaiveDate,
    pub expected_end: NaiveDate,
    pub actual_end: Option<NaiveDate>,
    pub damage_fee_cents: Option<i64>,
    pub note: Option<String>,
    pub status: RentalStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct RentalTerms {
    pub price_cents: i64,
    pub deposit_cents: Option<i64>,
    pub note: Option<String>,
}

impl RentalTerms {
    pub fn new(price_cents: i64) -> Self {
        Self {
            price_cents,
            ..Default::default()
        }
    }
}

/// Hands an item out. The renter is resolved to a customer, an active
/// reservation (if any) is converted, and the item moves to `rented` in one
/// transaction.
pub fn start_rental(
    conn: &mut Connection,
    item_id: i64,
    party: &PartyRef,
    terms: &RentalTerms,
    start_date: NaiveDate,
    expected_end: NaiveDate,
) -> Result<i64, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin rental failed: {e}")))?;

    let item = items::get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::Sold => {
            return Err(StoreError::conflict(format!("item {item_id} is sold")))
        }
        ItemStatus::Disposed => {
            return Err(StoreError::conflict(format!("item {item_id} is disposed")))
        }
        ItemStatus::InStock | ItemStatus::Listed | ItemStatus::Reserved | ItemStatus::Rented => {}
    }
    if find_active_for_item(&tx, item_id)?.is_some() {
        return Err(StoreError::conflict(format!(
            "item {item_id} already has an active rental"
        )));
    }
    if expected_end < start_date {
        return Err(StoreError::validation(format!(
            "expected end {expected_end} is before start date {start_date}"
        )));
    }

    let resolved = contacts::resolve_party(&tx, party)?;

    tx.execute(
        "insert into rentals (item_id, customer_id, price_cents, deposit_cents, start_date, \
         expected_end, note, status, created_at) values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            item_id,
            resolved.customer_id,
            terms.price_cents,
            terms.deposit_cents,
            start_date,
            expected_end,
            terms.note,
            RentalStatus::Active,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert rental failed: {e}")))?;
    let rental_id = tx.last_insert_rowid();

    if let Some(reservation) = reservations::find_active_for_item(&tx, item_id)? {
        reservations::mark_converted(&tx, reservation.id)?;
    }

    items::set_status_guarded(&tx, item_id, &ItemStatus::RENTABLE, ItemStatus::Rented)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit rental failed: {e}")))?;
    info!(
        "rented item {} to customer {} until {} (rental {})",
        item_id, resolved.customer_id, expected_end, rental_id
    );
    Ok(rental_id)
}

/// Takes an item back (or writes it off). The return date defaults to today;
/// a damage fee given here overrides one recorded earlier. Ending a rental
/// that is not active is a conflict, not a no-op.
pub fn end_rental(
    conn: &mut Connection,
    rental_id: i64,
    actual_end: Option<NaiveDate>,
    damage_fee_cents: Option<i64>,
    disposition: EndDisposition,
) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin rental end failed: {e}")))?;

    let rental = get_rental(&tx, rental_id)?;
    if rental.status != RentalStatus::Active {
        return Err(StoreError::conflict(format!(
            "rental {rental_id} is already ended"
        )));
    }

    let actual_end = actual_end.unwrap_or_else(|| Utc::now().date_naive());
    let damage_fee_cents = damage_fee_cents.or(rental.damage_fee_cents);

    let updated = tx
        .execute(
            "update rentals set status = 'ended', actual_end = ?, damage_fee_cents = ? \
             where id = ? and status = 'active'",
            params![actual_end, damage_fee_cents, rental_id],
        )
        .map_err(|e| StoreError::Db(format!("end rental failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::conflict(format!(
            "rental {rental_id} was modified concurrently"
        )));
    }

    items::set_status_guarded(
        &tx,
        rental.item_id,
        &[ItemStatus::Rented],
        disposition.item_status(),
    )?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit rental end failed: {e}")))?;
    info!(
        "ended rental {} for item {} ({})",
        rental_id,
        rental.item_id,
        disposition.item_status()
    );
    Ok(())
}

/// Records or corrects a damage fee on any rental, active or ended. No
/// status involvement.
pub fn set_damage_fee(
    conn: &Connection,
    rental_id: i64,
    fee_cents: i64,
) -> Result<(), StoreError> {
    let updated = conn
        .execute(
            "update rentals set damage_fee_cents = ? where id = ?",
            params![fee_cents, rental_id],
        )
        .map_err(|e| StoreError::Db(format!("update damage fee failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::not_found("rental", rental_id));
    }
    Ok(())
}

pub fn find_active_for_item(
    conn: &Connection,
    item_id: i64,
) -> Result<Option<RentalRow>, StoreError> {
    conn.query_row(
        &format!("{RENTAL_SELECT} where item_id = ? and status = 'active'"),
        params![item_id],
        read_rental_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select active rental failed: {e}")))
}

pub fn get_rental(conn: &Connection, rental_id: i64) -> Result<RentalRow, StoreError> {
    conn.query_row(
        &format!("{RENTAL_SELECT} where id = ?"),
        params![rental_id],
        read_rental_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select rental failed: {e}")))?
    .ok_or_else(|| StoreError::not_found("rental", rental_id))
}

const RENTAL_SELECT: &str =
    "select id, item_id, customer_id, price_cents, deposit_cents, start_date, expected_end, \
     actual_end, damage_fee_cents, note, status, created_at from rentals";

fn read_rental_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RentalRow> {
    Ok(RentalRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        customer_id: row.get(2)?,
        price_cents: row.get(3)?,
        deposit_cents: row.get(4)?,
        start_date: row.get(5)?,
        expected_end: row.get(6)?,
        actual_end: row.get(7)?,
        damage_fee_cents: row.get(8)?,
        note: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
    })
}
