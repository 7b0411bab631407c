// src/db/sales.rs
//
// A sale is terminal and unique per item (enforced by the schema and by the
// guard). The finalizer owns the whole handover: closing listings, consuming
// the reservation, picking the customer, and flipping the status, in one
// transaction. `delete_sale` is the compensating undo for a mis-entry.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::db::{contacts, items, listings, reservations};
use crate::domain::party::PartyRef;
use crate::domain::patch::SalePatch;
use crate::domain::status::ItemStatus;
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct SaleRow {
    pub id: i64,
    pub item_id: i64,
    pub customer_id: i64,
    pub price_cents: i64,
    pub sale_date: NaiveDate,
    pub notes: Option<String>,
    pub handover_note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct SaleTerms {
    pub price_cents: i64,
    pub sale_date: NaiveDate,
    pub notes: Option<String>,
    pub handover_note: Option<String>,
}

impl SaleTerms {
    pub fn new(price_cents: i64, sale_date: NaiveDate) -> Self {
        Self {
            price_cents,
            sale_date,
            notes: None,
            handover_note: None,
        }
    }
}

/// Finalizes a sale. The buyer comes from the active reservation's contact
/// when there is one; only otherwise does the caller's party reference count.
/// An item that was never advertised anywhere cannot be sold.
pub fn create_sale(
    conn: &mut Connection,
    item_id: i64,
    party: Option<&PartyRef>,
    terms: &SaleTerms,
) -> Result<i64, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin sale failed: {e}")))?;

    let item = items::get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::Sold => {
            return Err(StoreError::conflict(format!("item {item_id} is already sold")))
        }
        ItemStatus::Rented => {
            return Err(StoreError::conflict(format!(
                "item {item_id} is rented; end the rental first"
            )))
        }
        ItemStatus::Disposed => {
            return Err(StoreError::conflict(format!("item {item_id} is disposed")))
        }
        ItemStatus::InStock | ItemStatus::Listed | ItemStatus::Reserved => {}
    }

    if !listings::has_any_listing(&tx, item_id)? {
        return Err(StoreError::validation(format!(
            "item {item_id} must be listed before sale"
        )));
    }

    let reservation = reservations::find_active_for_item(&tx, item_id)?;
    let customer_id = match reservation.as_ref().and_then(|r| r.contact_id) {
        Some(contact_id) => contacts::customer_for_contact(&tx, contact_id)?,
        None => match party {
            Some(party) => contacts::resolve_party(&tx, party)?.customer_id,
            None => {
                return Err(StoreError::validation(format!(
                    "no buyer for item {item_id}: pass a party or reserve with a contact"
                )))
            }
        },
    };

    let closed = listings::close_open_listings(&tx, item_id)?;

    tx.execute(
        "insert into sales (item_id, customer_id, price_cents, sale_date, notes, handover_note, \
         created_at) values (?, ?, ?, ?, ?, ?, ?)",
        params![
            item_id,
            customer_id,
            terms.price_cents,
            terms.sale_date,
            terms.notes,
            terms.handover_note,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert sale failed: {e}")))?;
    let sale_id = tx.last_insert_rowid();

    if let Some(reservation) = reservation {
        reservations::mark_converted(&tx, reservation.id)?;
    }

    items::set_status_guarded(&tx, item_id, &ItemStatus::SELLABLE, ItemStatus::Sold)?;
    items::set_listed_flag(&tx, item_id, false)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit sale failed: {e}")))?;
    info!(
        "sold item {} to customer {} for {} cents (sale {}, {} listings closed)",
        item_id, customer_id, terms.price_cents, sale_id, closed
    );
    Ok(sale_id)
}

/// Merge-applies corrections to a recorded sale. Price, date and notes only;
/// the item status is out of reach from here.
pub fn update_sale(conn: &mut Connection, sale_id: i64, patch: &SalePatch) -> Result<(), StoreError> {
    if patch.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin sale update failed: {e}")))?;

    let current = get_sale(&tx, sale_id)?;
    let price_cents = patch.price_cents.resolve(current.price_cents);
    let sale_date = patch.sale_date.resolve(current.sale_date);
    let notes = patch.notes.clone().resolve(current.notes);
    let handover_note = patch.handover_note.clone().resolve(current.handover_note);

    tx.execute(
        "update sales set price_cents = ?, sale_date = ?, notes = ?, handover_note = ? \
         where id = ?",
        params![price_cents, sale_date, notes, handover_note, sale_id],
    )
    .map_err(|e| StoreError::Db(format!("update sale failed: {e}")))?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit sale update failed: {e}")))
}

/// Undoes a mis-entered sale: the row is removed and the item goes back to
/// `in_stock`. The status write is conditional on the item still being
/// `sold`; anything else means the books are inconsistent and the undo
/// aborts.
pub fn delete_sale(conn: &mut Connection, sale_id: i64) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin sale delete failed: {e}")))?;

    let sale = get_sale(&tx, sale_id)?;
    tx.execute("delete from sales where id = ?", params![sale_id])
        .map_err(|e| StoreError::Db(format!("delete sale failed: {e}")))?;

    items::set_status_guarded(&tx, sale.item_id, &[ItemStatus::Sold], ItemStatus::InStock)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit sale delete failed: {e}")))?;
    info!("deleted sale {} (item {} back in stock)", sale_id, sale.item_id);
    Ok(())
}

pub fn find_for_item(conn: &Connection, item_id: i64) -> Result<Option<SaleRow>, StoreError> {
    conn.query_row(
        &format!("{SALE_SELECT} where item_id = ?"),
        params![item_id],
        read_sale_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select sale by item failed: {e}")))
}

pub fn get_sale(conn: &Connection, sale_id: i64) -> Result<SaleRow, StoreError> {
    conn.query_row(
        &format!("{SALE_SELECT} where id = ?"),
        params![sale_id],
        read_sale_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select sale failed: {e}")))?
    .ok_or_else(|| StoreError::not_found("sale", sale_id))
}

const SALE_SELECT: &str = "select id, item_id, customer_id, price_cents, sale_date, notes, \
                           handover_note, created_at from sales";

fn read_sale_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SaleRow> {
    Ok(SaleRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        customer_id: row.get(2)?,
        price_cents: row.get(3)?,
        sale_date: row.get(4)?,
        notes: row.get(5)?,
        handover_note: row.get(6)?,
        created_at: row.get(7)?,
    })
}
