// src/db/listings.rs
//
// Listings are where-we-advertised records, several per item across
// platforms. `items.is_listed` is the denormalized any-open-listing flag and
// is only ever written next to the listing rows it summarizes, inside the
// same transaction.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;
use tracing::info;

use crate::db::items;
use crate::domain::status::{ItemStatus, ListingStatus};
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ListingRow {
    pub id: i64,
    pub item_id: i64,
    pub platform: String,
    pub url: Option<String>,
    pub price_cents: Option<i64>,
    pub status: ListingStatus,
    pub created_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct NewListing {
    pub platform: String,
    pub url: Option<String>,
    pub price_cents: Option<i64>,
}

impl NewListing {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            ..Default::default()
        }
    }
}

/// Posts an item on a platform: one new `active` listing row, the aggregate
/// flag set, and the item moved to `listed`. A reserved item can be listed
/// too; its reservation stays active and cancel handles the status later.
pub fn create_listing(
    conn: &mut Connection,
    item_id: i64,
    listing: &NewListing,
) -> Result<i64, StoreError> {
    if listing.platform.trim().is_empty() {
        return Err(StoreError::validation("listing platform cannot be empty"));
    }

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin listing failed: {e}")))?;

    let item = items::get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::Sold => {
            return Err(StoreError::conflict(format!("item {item_id} is sold")))
        }
        ItemStatus::Disposed => {
            return Err(StoreError::conflict(format!("item {item_id} is disposed")))
        }
        ItemStatus::Rented => {
            return Err(StoreError::conflict(format!("item {item_id} is rented")))
        }
        ItemStatus::InStock | ItemStatus::Listed | ItemStatus::Reserved => {}
    }

    tx.execute(
        "insert into listings (item_id, platform, url, price_cents, status, created_at) \
         values (?, ?, ?, ?, ?, ?)",
        params![
            item_id,
            listing.platform,
            listing.url,
            listing.price_cents,
            ListingStatus::Active,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert listing failed: {e}")))?;
    let listing_id = tx.last_insert_rowid();

    items::set_listed_flag(&tx, item_id, true)?;
    items::set_status_guarded(&tx, item_id, &ItemStatus::LISTABLE, ItemStatus::Listed)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit listing failed: {e}")))?;
    info!(
        "listed item {} on {} (listing {})",
        item_id, listing.platform, listing_id
    );
    Ok(listing_id)
}

/// Takes an item off every platform at once: all open listings closed and the
/// flag cleared. The stored status is left alone; there is no listed-to-stock
/// transition.
pub fn unlist_item(conn: &mut Connection, item_id: i64) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin unlist failed: {e}")))?;

    let item = items::get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::InStock | ItemStatus::Listed | ItemStatus::Reserved => {}
        other => {
            return Err(StoreError::conflict(format!(
                "item {item_id} is {other}; nothing to unlist"
            )))
        }
    }

    let closed = close_open_listings(&tx, item_id)?;
    items::set_listed_flag(&tx, item_id, false)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit unlist failed: {e}")))?;
    info!("unlisted item {} ({} listings closed)", item_id, closed);
    Ok(())
}

/// Closes the given listings after their platform pages were brought up to
/// date by hand. Every id must belong to the item; a foreign or unknown id
/// fails the whole call before anything is written.
pub fn confirm_listings_updated(
    conn: &mut Connection,
    item_id: i64,
    listing_ids: &[i64],
) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin confirm listings failed: {e}")))?;

    items::get_item(&tx, item_id)?;
    if listing_ids.is_empty() {
        return Ok(());
    }

    for listing_id in listing_ids {
        let owner: Option<i64> = tx
            .query_row(
                "select item_id from listings where id = ?",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Db(format!("select listing owner failed: {e}")))?;
        if owner != Some(item_id) {
            return Err(StoreError::validation(format!(
                "listing {listing_id} does not belong to item {item_id}"
            )));
        }
    }

    let mut sql = String::from(
        "update listings set status = 'closed', closed_at = ? \
         where status in ('active', 'needs_update') and id in (",
    );
    for i in 0..listing_ids.len() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
    }
    sql.push(')');

    let now = Utc::now().naive_utc();
    let mut args: Vec<&dyn ToSql> = vec![&now];
    for id in listing_ids {
        args.push(id);
    }
    tx.execute(&sql, args.as_slice())
        .map_err(|e| StoreError::Db(format!("close confirmed listings failed: {e}")))?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit confirm listings failed: {e}")))
}

/// Flags every active listing of the item as needing a platform-side edit.
/// Runs inside the reservation transaction; also callable on its own.
pub fn mark_listings_needs_update(conn: &Connection, item_id: i64) -> Result<usize, StoreError> {
    conn.execute(
        "update listings set status = 'needs_update' where item_id = ? and status = 'active'",
        params![item_id],
    )
    .map_err(|e| StoreError::Db(format!("flag listings failed: {e}")))
}

/// Closes every open listing of the item, stamping `closed_at`. Shared by
/// unlisting and by the sale finalizer.
pub(crate) fn close_open_listings(conn: &Connection, item_id: i64) -> Result<usize, StoreError> {
    conn.execute(
        "update listings set status = 'closed', closed_at = ? \
         where item_id = ? and status in ('active', 'needs_update')",
        params![Utc::now().naive_utc(), item_id],
    )
    .map_err(|e| StoreError::Db(format!("close listings failed: {e}")))
}

/// True when the item has ever had a listing, open or closed. Sales use this
/// as the was-it-advertised check.
pub fn has_any_listing(conn: &Connection, item_id: i64) -> Result<bool, StoreError> {
    conn.query_row(
        "select exists(select 1 from listings where item_id = ?)",
        params![item_id],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Db(format!("probe listings failed: {e}")))
}

pub fn listings_for_item(conn: &Connection, item_id: i64) -> Result<Vec<ListingRow>, StoreError> {
    let mut stmt = conn
        .prepare(
            "select id, item_id, platform, url, price_cents, status, created_at, closed_at \
             from listings where item_id = ? order by id",
        )
        .map_err(|e| StoreError::Db(format!("prepare listings failed: {e}")))?;
    let rows = stmt
        .query_map(params![item_id], |row| {
            Ok(ListingRow {
                id: row.get(0)?,
                item_id: row.get(1)?,
                platform: row.get(2)?,
                url: row.get(3)?,
                price_cents: row.get(4)?,
                status: row.get(5)?,
                created_at: row.get(6)?,
                closed_at: row.get(7)?,
            })
        })
        .map_err(|e| StoreError::Db(format!("query listings failed: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| StoreError::Db(format!("read listing failed: {e}")))?);
    }
    Ok(out)
}
