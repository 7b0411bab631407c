// src/db/items.rs
//
// The item is the root record: created once at acquisition, mutated in place
// ever after. Every status change in the whole crate funnels through
// `set_status_guarded`, a conditional UPDATE whose affected-row count is
// checked inside the caller's transaction — the last write of each manager
// operation, so two racing requests cannot both move the same item.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;
use tracing::info;

use crate::domain::patch::ItemPatch;
use crate::domain::status::{derive_display_status, ItemStatus};
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub status: ItemStatus,
    pub location: Option<String>,
    pub acquired_at: Option<NaiveDate>,
    pub acquired_from: Option<String>,
    pub acquisition_cost_cents: Option<i64>,
    pub is_listed: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Acquisition input. Only the name is required; an absent category falls
/// back to the catch-all category when one is defined.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub name: String,
    pub category_id: Option<i64>,
    pub location: Option<String>,
    pub acquired_at: Option<NaiveDate>,
    pub acquired_from: Option<String>,
    pub acquisition_cost_cents: Option<i64>,
    pub notes: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One line of the stock overview: the stored row plus the derived display
/// status (stored status, except "overdue" for a rental past its expected
/// end).
#[derive(Debug, Clone, Serialize)]
pub struct ItemOverview {
    pub id: i64,
    pub name: String,
    pub status: ItemStatus,
    pub display_status: &'static str,
    pub location: Option<String>,
    pub is_listed: bool,
}

/// Counts per stored status, plus the derived overdue count, for the ops
/// summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockSummary {
    pub in_stock: i64,
    pub listed: i64,
    pub reserved: i64,
    pub rented: i64,
    pub sold: i64,
    pub disposed: i64,
    pub overdue: i64,
}

const ITEM_COLUMNS: &str = "id, name, category_id, status, location, acquired_at, acquired_from, \
                            acquisition_cost_cents, is_listed, notes, created_at, updated_at";

fn read_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        status: row.get(3)?,
        location: row.get(4)?,
        acquired_at: row.get(5)?,
        acquired_from: row.get(6)?,
        acquisition_cost_cents: row.get(7)?,
        is_listed: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Records a newly acquired item; it starts `in_stock` and unlisted.
pub fn create_item(conn: &Connection, item: &NewItem) -> Result<i64, StoreError> {
    if item.name.trim().is_empty() {
        return Err(StoreError::validation("item name cannot be empty"));
    }

    let category_id = match item.category_id {
        Some(id) => {
            category_exists(conn, id)?;
            Some(id)
        }
        None => default_category_id(conn)?,
    };

    let now = Utc::now().naive_utc();
    conn.execute(
        "insert into items (name, category_id, status, location, acquired_at, acquired_from, \
         acquisition_cost_cents, is_listed, notes, created_at, updated_at) \
         values (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
        params![
            item.name,
            category_id,
            ItemStatus::InStock,
            item.location,
            item.acquired_at,
            item.acquired_from,
            item.acquisition_cost_cents,
            item.notes,
            now,
            now,
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert item failed: {e}")))?;

    let id = conn.last_insert_rowid();
    info!("acquired item {} ({})", id, item.name);
    Ok(id)
}

pub fn find_item(conn: &Connection, item_id: i64) -> Result<Option<ItemRow>, StoreError> {
    conn.query_row(
        &format!("select {ITEM_COLUMNS} from items where id = ?"),
        params![item_id],
        read_item_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select item failed: {e}")))
}

pub fn get_item(conn: &Connection, item_id: i64) -> Result<ItemRow, StoreError> {
    find_item(conn, item_id)?.ok_or_else(|| StoreError::not_found("item", item_id))
}

/// Merge-applies a partial update to the item's descriptive fields. Status
/// and the listing flag are not reachable from here. An all-`Keep` patch
/// writes nothing.
pub fn update_item(conn: &mut Connection, item_id: i64, patch: &ItemPatch) -> Result<(), StoreError> {
    if patch.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin item update failed: {e}")))?;

    let current = get_item(&tx, item_id)?;

    let name = patch.name.clone().resolve(current.name);
    if name.trim().is_empty() {
        return Err(StoreError::validation("item name cannot be empty"));
    }
    let category_id = patch.category_id.resolve(current.category_id);
    if let Some(id) = category_id {
        category_exists(&tx, id)?;
    }

    let location = patch.location.clone().resolve(current.location);
    let acquired_at = patch.acquired_at.resolve(current.acquired_at);
    let acquired_from = patch.acquired_from.clone().resolve(current.acquired_from);
    let acquisition_cost_cents = patch
        .acquisition_cost_cents
        .resolve(current.acquisition_cost_cents);
    let notes = patch.notes.clone().resolve(current.notes);

    tx.execute(
        "update items set name = ?, category_id = ?, location = ?, acquired_at = ?, \
         acquired_from = ?, acquisition_cost_cents = ?, notes = ?, updated_at = ? where id = ?",
        params![
            name,
            category_id,
            location,
            acquired_at,
            acquired_from,
            acquisition_cost_cents,
            notes,
            Utc::now().naive_utc(),
            item_id,
        ],
    )
    .map_err(|e| StoreError::Db(format!("update item failed: {e}")))?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit item update failed: {e}")))
}

/// Explicitly disposes an item. A rented item cannot be disposed here — that
/// path goes through ending the rental with a disposed disposition.
pub fn dispose_item(conn: &mut Connection, item_id: i64) -> Result<(), StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Db(format!("begin dispose failed: {e}")))?;

    let item = get_item(&tx, item_id)?;
    match item.status {
        ItemStatus::Sold => {
            return Err(StoreError::conflict(format!("item {item_id} is sold")))
        }
        ItemStatus::Disposed => {
            return Err(StoreError::conflict(format!(
                "item {item_id} is already disposed"
            )))
        }
        ItemStatus::Rented => {
            return Err(StoreError::conflict(format!(
                "item {item_id} is rented; end the rental to dispose it"
            )))
        }
        ItemStatus::InStock | ItemStatus::Listed | ItemStatus::Reserved => {}
    }

    set_status_guarded(&tx, item_id, &ItemStatus::DISPOSABLE, ItemStatus::Disposed)?;

    tx.commit()
        .map_err(|e| StoreError::Db(format!("commit dispose failed: {e}")))?;
    info!("disposed item {}", item_id);
    Ok(())
}

/// Stock overview with the derived display status per row.
pub fn list_items(conn: &Connection, today: NaiveDate) -> Result<Vec<ItemOverview>, StoreError> {
    let mut stmt = conn
        .prepare(
            "select i.id, i.name, i.status, i.location, i.is_listed, r.expected_end \
             from items i \
             left join rentals r on r.item_id = i.id and r.status = 'active' \
             order by i.id",
        )
        .map_err(|e| StoreError::Db(format!("prepare item overview failed: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let status: ItemStatus = row.get(2)?;
            let expected_end: Option<NaiveDate> = row.get(5)?;
            Ok(ItemOverview {
                id: row.get(0)?,
                name: row.get(1)?,
                status,
                display_status: derive_display_status(status, expected_end, today),
                location: row.get(3)?,
                is_listed: row.get(4)?,
            })
        })
        .map_err(|e| StoreError::Db(format!("query item overview failed: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| StoreError::Db(format!("read item overview failed: {e}")))?);
    }
    Ok(out)
}

/// Counts items per stored status and derives the overdue count from active
/// rentals past their expected end.
pub fn status_counts(conn: &Connection, today: NaiveDate) -> Result<StockSummary, StoreError> {
    let mut summary = StockSummary::default();

    let mut stmt = conn
        .prepare("select status, count(*) from items group by status")
        .map_err(|e| StoreError::Db(format!("prepare status counts failed: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            let status: ItemStatus = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })
        .map_err(|e| StoreError::Db(format!("query status counts failed: {e}")))?;

    for row in rows {
        let (status, count) =
            row.map_err(|e| StoreError::Db(format!("read status counts failed: {e}")))?;
        match status {
            ItemStatus::InStock => summary.in_stock = count,
            ItemStatus::Listed => summary.listed = count,
            ItemStatus::Reserved => summary.reserved = count,
            ItemStatus::Rented => summary.rented = count,
            ItemStatus::Sold => summary.sold = count,
            ItemStatus::Disposed => summary.disposed = count,
        }
    }

    summary.overdue = conn
        .query_row(
            "select count(*) from items i \
             join rentals r on r.item_id = i.id and r.status = 'active' \
             where i.status = 'rented' and r.expected_end < ?",
            params![today],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Db(format!("count overdue failed: {e}")))?;

    Ok(summary)
}

/// Moves the item status with a compare-and-swap: the UPDATE only matches
/// when the stored status is still one of `allowed`, and an affected-row
/// count other than one aborts the caller's transaction. Guards read the
/// status first for a precise error; this is the backstop that makes the
/// read-then-write safe under concurrency.
pub(crate) fn set_status_guarded(
    conn: &Connection,
    item_id: i64,
    allowed: &[ItemStatus],
    next: ItemStatus,
) -> Result<(), StoreError> {
    let mut sql =
        String::from("update items set status = ?, updated_at = ? where id = ? and status in (");
    for i in 0..allowed.len() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
    }
    sql.push(')');

    let now = Utc::now().naive_utc();
    let mut args: Vec<&dyn ToSql> = vec![&next, &now, &item_id];
    for status in allowed {
        args.push(status);
    }

    let updated = conn
        .execute(&sql, args.as_slice())
        .map_err(|e| StoreError::Db(format!("update item status failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::conflict(format!(
            "item {item_id} was modified concurrently"
        )));
    }
    Ok(())
}

/// Clears or sets the aggregate listing flag. Callers run this inside their
/// transaction next to the listing writes it mirrors.
pub(crate) fn set_listed_flag(
    conn: &Connection,
    item_id: i64,
    listed: bool,
) -> Result<(), StoreError> {
    let updated = conn
        .execute(
            "update items set is_listed = ?, updated_at = ? where id = ?",
            params![listed, Utc::now().naive_utc(), item_id],
        )
        .map_err(|e| StoreError::Db(format!("update listing flag failed: {e}")))?;
    if updated != 1 {
        return Err(StoreError::not_found("item", item_id));
    }
    Ok(())
}

/// Defines (or finds) the catch-all category, tagging it with the explicit
/// flag the item creation fallback keys on. Name comparison never decides
/// catch-all-ness at use time.
pub fn ensure_catch_all_category(conn: &Connection, name: &str) -> Result<i64, StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::validation("category name cannot be empty"));
    }
    conn.execute(
        "insert or ignore into categories (name, is_catch_all, created_at) values (?, 1, ?)",
        params![name, Utc::now().naive_utc()],
    )
    .map_err(|e| StoreError::Db(format!("insert catch-all category failed: {e}")))?;

    conn.query_row(
        "select id from categories where name = ?",
        params![name],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Db(format!("select catch-all category failed: {e}")))
}

fn category_exists(conn: &Connection, category_id: i64) -> Result<(), StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "select id from categories where id = ?",
            params![category_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::Db(format!("select category failed: {e}")))?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::not_found("category", category_id)),
    }
}

fn default_category_id(conn: &Connection) -> Result<Option<i64>, StoreError> {
    conn.query_row(
        "select id from categories where is_catch_all = 1 order by id limit 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select default category failed: {e}")))
}
