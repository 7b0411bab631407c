// src/db/reservations.rs
//
// A reservation is a hold with a person attached: at most one active per
// item, optionally expecting a deposit, ending as cancelled or converted
// (never deleted). Conversion happens inside the rental or sale transaction
// that consumes the hold.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{contacts, items, listings, rentals};
use crate::domain::party::PartyRef;
use crate::domain::status::{ItemStatus, ReservationStatus, ReserveType};
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ReservationRow {
    pub id: i64,
    pub item_id: i64,
    pub contact_id: Option<i64>,
    pub reserve_type: ReserveType,
    pub deposit_expected_cents: Option<i64>,
    pub deposit_received: bool,
    pub deposit_received_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub note: Option<String>,
    pub status: ReservationStatus,
    pub created_at: NaiveDateTime,
    pub cancelled_at: Option<NaiveDateTime>,
    pub converted_at: Option<NaiveDateTime>,
}

/// Optional knobs for a new reservation. `expires_at` is informational; no
/// background job enforces it.
#[derive(Debug, Clone, Default)]
pub struct ReserveOpts {
    pub deposit_expected_cents: Option<i64>,
    pub expires_at: Option<NaiveDateTime>,
    pub note: Option<String>,
}

/// Places a hold on an item for a party. The party is resolved up front, so
/// a contact-based reservation materializes its customer record here, not at
/// conversion time. Active listings are flagged for a platform-side edit in
/// the same transaction.
pub fn reserve(
    conn: &mut Connection,
    item_id: i64,
    party: &PartyRef,
    reserve_type: ReserveType,
    opts: &ReserveOpts,
) -> Result<i64, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin reserve failed: {e}")))?;

    let item = items::get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::Sold => {
            return Err(StoreError::conflict(format!("item {item_id} is sold")))
        }
        ItemStatus::Rented => {
            return Err(StoreError::conflict(format!("item {item_id} is rented")))
        }
        ItemStatus::Disposed => {
            return Err(StoreError::conflict(format!("item {item_id} is disposed")))
        }
        ItemStatus::Reserved => {
            return Err(StoreError::conflict(format!(
                "item {item_id} is already reserved"
            )))
        }
        ItemStatus::InStock | ItemStatus::Listed => {}
    }

    if find_active_for_item(&tx, item_id)?.is_some() {
        return Err(StoreError::conflict(format!(
            "item {item_id} already has an active reservation"
        )));
    }
    if rentals::find_active_for_item(&tx, item_id)?.is_some() {
        return Err(StoreError::conflict(format!(
            "item {item_id} has an active rental"
        )));
    }

    let resolved = contacts::resolve_party(&tx, party)?;

    tx.execute(
        "insert into reservations (item_id, contact_id, reserve_type, deposit_expected_cents, \
         deposit_received, expires_at, note, status, created_at) \
         values (?, ?, ?, ?, 0, ?, ?, ?, ?)",
        params![
            item_id,
            resolved.contact_id,
            reserve_type,
            opts.deposit_expected_cents,
            opts.expires_at,
            opts.note,
            ReservationStatus::Active,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert reservation failed: {e}")))?;
    let reservation_id = tx.last_insert_rowid();

    let flagged = listings::mark_listings_needs_update(&tx, item_id)?;
    items::set_status_guarded(&tx, item_id, &ItemStatus::RESERVABLE, ItemStatus::Reserved)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit reserve failed: {e}")))?;
    info!(
        "reserved item {} for customer {} (reservation {}, {} listings flagged)",
        item_id, resolved.customer_id, reservation_id, flagged
    );
    Ok(reservation_id)
}

/// Records that the expected deposit arrived. Only an active reservation can
/// take a deposit; the timestamp defaults to now.
pub fn set_deposit_received(
    conn: &mut Connection,
    reservation_id: i64,
    received_at: Option<NaiveDateTime>,
) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin deposit update failed: {e}")))?;

    let reservation = get_reservation(&tx, reservation_id)?;
    if reservation.status != ReservationStatus::Active {
        return Err(StoreError::conflict(format!(
            "reservation {reservation_id} is {}",
            reservation.status
        )));
    }

    let received_at = received_at.unwrap_or_else(|| Utc::now().naive_utc());
    let updated = tx
        .execute(
            "update reservations set deposit_received = 1, deposit_received_at = ? \
             where id = ? and status = 'active'",
            params![received_at, reservation_id],
        )
        .map_err(|e| StoreError::Db(format!("update deposit failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::conflict(format!(
            "reservation {reservation_id} was modified concurrently"
        )));
    }

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit deposit update failed: {e}")))
}

/// Releases a hold. The reservation keeps its row as `cancelled`; the item
/// goes back to `in_stock` only if it still sits in `reserved` (a listing
/// made during the hold keeps it `listed`).
pub fn cancel_reservation(conn: &mut Connection, reservation_id: i64) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin cancel failed: {e}")))?;

    let reservation = get_reservation(&tx, reservation_id)?;
    if reservation.status != ReservationStatus::Active {
        return Err(StoreError::conflict(format!(
            "reservation {reservation_id} is already {}",
            reservation.status
        )));
    }

    let updated = tx
        .execute(
            "update reservations set status = 'cancelled', cancelled_at = ? \
             where id = ? and status = 'active'",
            params![Utc::now().naive_utc(), reservation_id],
        )
        .map_err(|e| StoreError::Db(format!("cancel reservation failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::conflict(format!(
            "reservation {reservation_id} was modified concurrently"
        )));
    }

    // Conditional on purpose: zero affected rows is fine here.
    let restored = tx
        .execute(
            "update items set status = 'in_stock', updated_at = ? \
             where id = ? and status = 'reserved'",
            params![Utc::now().naive_utc(), reservation.item_id],
        )
        .map_err(|e| StoreError::Db(format!("restore item status failed: {e}")))?;
    if restored == 0 {
        warn!(
            "item {} was not in reserved at cancel; leaving its status alone",
            reservation.item_id
        );
    }

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit cancel failed: {e}")))?;
    info!(
        "cancelled reservation {} for item {}",
        reservation_id, reservation.item_id
    );
    Ok(())
}

/// Flips an active reservation to `converted`. Runs inside the transaction
/// that creates the rental or sale consuming the hold.
pub(crate) fn mark_converted(conn: &Connection, reservation_id: i64) -> Result<(), StoreError> {
    let updated = conn
        .execute(
            "update reservations set status = 'converted', converted_at = ? \
             where id = ? and status = 'active'",
            params![Utc::now().naive_utc(), reservation_id],
        )
        .map_err(|e| StoreError::Db(format!("convert reservation failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::conflict(format!(
            "reservation {reservation_id} is no longer active"
        )));
    }
    Ok(())
}

pub fn find_active_for_item(
    conn: &Connection,
    item_id: i64,
) -> Result<Option<ReservationRow>, StoreError> {
    conn.query_row(
        &format!("{RESERVATION_SELECT} where item_id = ? and status = 'active'"),
        params![item_id],
        read_reservation_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select active reservation failed: {e}")))
}

pub fn get_reservation(
    conn: &Connection,
    reservation_id: i64,
) -> Result<ReservationRow, StoreError> {
    conn.query_row(
        &format!("{RESERVATION_SELECT} where id = ?"),
        params![reservation_id],
        read_reservation_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select reservation failed: {e}")))?
    .ok_or_else(|| StoreError::not_found("reservation", reservation_id))
}

const RESERVATION_SELECT: &str =
    "select id, item_id, contact_id, reserve_type, deposit_expected_cents, deposit_received, \
     deposit_received_at, expires_at, note, status, created_at, cancelled_at, converted_at \
     from reservations";

fn read_reservation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReservationRow> {
    Ok(ReservationRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        contact_id: row.get(2)?,
        reserve_type: row.get(3)?,
        deposit_expected_cents: row.get(4)?,
        deposit_received: row.get(5)?,
        deposit_received_at: row.get(6)?,
        expires_at: row.get(7)?,
        note: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        cancelled_at: row.get(11)?,
        converted_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{create_item, get_item, set_status_guarded, NewItem};
    use crate::db::listings::{create_listing, listings_for_item, NewListing};
    use crate::domain::party::NewContact;
    use crate::domain::status::ListingStatus;
    use crate::tests::utils::test_conn;

    fn reserve_for_new_contact(
        conn: &mut Connection,
        item_id: i64,
        name: &str,
    ) -> Result<i64, StoreError> {
        reserve(
            conn,
            item_id,
            &PartyRef::NewContact(NewContact::new(name)),
            ReserveType::Sale,
            &ReserveOpts::default(),
        )
    }

    #[test]
    fn reserving_holds_the_item_and_flags_its_listings() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        create_listing(&mut conn, item_id, &NewListing::new("craigslist")).unwrap();

        let reservation_id = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        assert_eq!(get_item(&conn, item_id).unwrap().status, ItemStatus::Reserved);

        let reservation = get_reservation(&conn, reservation_id).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Active);
        assert!(reservation.contact_id.is_some());
        assert!(!reservation.deposit_received);

        // The customer is materialized at reserve time, not at conversion.
        let customers: i64 = conn
            .query_row("select count(*) from customers", [], |r| r.get(0))
            .unwrap();
        assert_eq!(customers, 1);

        assert_eq!(
            listings_for_item(&conn, item_id).unwrap()[0].status,
            ListingStatus::NeedsUpdate
        );
    }

    #[test]
    fn only_one_active_reservation_per_item() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        let err = reserve_for_new_contact(&mut conn, item_id, "Noah").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The losing call wrote nothing, not even its contact.
        let reservations: i64 = conn
            .query_row("select count(*) from reservations", [], |r| r.get(0))
            .unwrap();
        let contacts: i64 = conn
            .query_row("select count(*) from contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(reservations, 1);
        assert_eq!(contacts, 1);
    }

    #[test]
    fn reserving_a_rented_or_sold_item_is_a_conflict_with_zero_writes() {
        let mut conn = test_conn();
        let rented = create_item(&conn, &NewItem::new("bike")).unwrap();
        set_status_guarded(&conn, rented, &[ItemStatus::InStock], ItemStatus::Rented).unwrap();
        let sold = create_item(&conn, &NewItem::new("tent")).unwrap();
        set_status_guarded(&conn, sold, &[ItemStatus::InStock], ItemStatus::Sold).unwrap();

        for item_id in [rented, sold] {
            let err = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        let reservations: i64 = conn
            .query_row("select count(*) from reservations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(reservations, 0);
    }

    #[test]
    fn deposit_can_only_land_on_an_active_reservation() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        let reservation_id = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        set_deposit_received(&mut conn, reservation_id, None).unwrap();
        let row = get_reservation(&conn, reservation_id).unwrap();
        assert!(row.deposit_received);
        assert!(row.deposit_received_at.is_some());

        cancel_reservation(&mut conn, reservation_id).unwrap();
        let err = set_deposit_received(&mut conn, reservation_id, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn cancel_returns_a_reserved_item_to_stock() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        let reservation_id = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        cancel_reservation(&mut conn, reservation_id).unwrap();

        assert_eq!(get_item(&conn, item_id).unwrap().status, ItemStatus::InStock);
        let row = get_reservation(&conn, reservation_id).unwrap();
        assert_eq!(row.status, ReservationStatus::Cancelled);
        assert!(row.cancelled_at.is_some());

        // Cancelling again is a conflict, and the item can be held anew.
        let err = cancel_reservation(&mut conn, reservation_id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        reserve_for_new_contact(&mut conn, item_id, "Noah").unwrap();
    }

    #[test]
    fn cancel_leaves_a_relisted_item_listed() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        let reservation_id = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        // Listing during the hold moves the item to listed.
        create_listing(&mut conn, item_id, &NewListing::new("marketplace")).unwrap();
        assert_eq!(get_item(&conn, item_id).unwrap().status, ItemStatus::Listed);

        cancel_reservation(&mut conn, reservation_id).unwrap();
        assert_eq!(get_item(&conn, item_id).unwrap().status, ItemStatus::Listed);
    }

    #[test]
    fn converting_a_consumed_reservation_fails() {
        let mut conn = test_conn();
        let item_id = create_item(&conn, &NewItem::new("bike")).unwrap();
        let reservation_id = reserve_for_new_contact(&mut conn, item_id, "Priya").unwrap();

        mark_converted(&conn, reservation_id).unwrap();
        let row = get_reservation(&conn, reservation_id).unwrap();
        assert_eq!(row.status, ReservationStatus::Converted);
        assert!(row.converted_at.is_some());

        let err = mark_converted(&conn, reservation_id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
