// src/db/contacts.rs
//
// Two identity tables: contacts are platform handles we message, customers
// are the accountable parties rentals and sales hang off. A contact gets a
// customer record materialized lazily, the first time it is party to a
// transaction, and keeps it for good.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::domain::party::{NewContact, NewCustomer, PartyRef, ResolvedParty};
use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ContactRow {
    pub id: i64,
    pub name: String,
    pub platform: Option<String>,
    pub handle: Option<String>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerRow {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub contact_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

pub fn create_contact(conn: &Connection, contact: &NewContact) -> Result<i64, StoreError> {
    if contact.name.trim().is_empty() {
        return Err(StoreError::validation("contact name cannot be empty"));
    }
    conn.execute(
        "insert into contacts (name, platform, handle, note, created_at) values (?, ?, ?, ?, ?)",
        params![
            contact.name,
            contact.platform,
            contact.handle,
            contact.note,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert contact failed: {e}")))?;
    Ok(conn.last_insert_rowid())
}

pub fn create_customer(conn: &Connection, customer: &NewCustomer) -> Result<i64, StoreError> {
    if customer.name.trim().is_empty() {
        return Err(StoreError::validation("customer name cannot be empty"));
    }
    conn.execute(
        "insert into customers (name, phone, email, note, created_at) values (?, ?, ?, ?, ?)",
        params![
            customer.name,
            customer.phone,
            customer.email,
            customer.note,
            Utc::now().naive_utc(),
        ],
    )
    .map_err(|e| StoreError::Db(format!("insert customer failed: {e}")))?;
    Ok(conn.last_insert_rowid())
}

pub fn find_contact(conn: &Connection, contact_id: i64) -> Result<Option<ContactRow>, StoreError> {
    conn.query_row(
        "select id, name, platform, handle, note, created_at from contacts where id = ?",
        params![contact_id],
        |row| {
            Ok(ContactRow {
                id: row.get(0)?,
                name: row.get(1)?,
                platform: row.get(2)?,
                handle: row.get(3)?,
                note: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select contact failed: {e}")))
}

pub fn get_contact(conn: &Connection, contact_id: i64) -> Result<ContactRow, StoreError> {
    find_contact(conn, contact_id)?.ok_or_else(|| StoreError::not_found("contact", contact_id))
}

pub fn find_customer(
    conn: &Connection,
    customer_id: i64,
) -> Result<Option<CustomerRow>, StoreError> {
    conn.query_row(
        "select id, name, phone, email, contact_id, note, created_at \
         from customers where id = ?",
        params![customer_id],
        read_customer_row,
    )
    .optional()
    .map_err(|e| StoreError::Db(format!("select customer failed: {e}")))
}

pub fn get_customer(conn: &Connection, customer_id: i64) -> Result<CustomerRow, StoreError> {
    find_customer(conn, customer_id)?.ok_or_else(|| StoreError::not_found("customer", customer_id))
}

fn read_customer_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CustomerRow> {
    Ok(CustomerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        contact_id: row.get(4)?,
        note: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Returns the customer record backing a contact, creating it on first use.
/// Calling this twice for the same contact returns the same customer id.
pub fn customer_for_contact(conn: &Connection, contact_id: i64) -> Result<i64, StoreError> {
    let existing: Option<i64> = conn
        .query_row(
            "select id from customers where contact_id = ?",
            params![contact_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::Db(format!("select customer by contact failed: {e}")))?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let contact = get_contact(conn, contact_id)?;
    conn.execute(
        "insert into customers (name, contact_id, created_at) values (?, ?, ?)",
        params![contact.name, contact_id, Utc::now().naive_utc()],
    )
    .map_err(|e| StoreError::Db(format!("insert customer for contact failed: {e}")))?;
    let id = conn.last_insert_rowid();
    info!("materialized customer {} for contact {}", id, contact_id);
    Ok(id)
}

/// Turns any way of naming a party into a concrete customer id plus the
/// contact it came through, if any. Total over the reference type, so the
/// managers never see a half-resolved party.
pub fn resolve_party(conn: &Connection, party: &PartyRef) -> Result<ResolvedParty, StoreError> {
    match party {
        PartyRef::Customer(id) => {
            let customer = get_customer(conn, *id)?;
            Ok(ResolvedParty {
                customer_id: customer.id,
                contact_id: customer.contact_id,
            })
        }
        PartyRef::Contact(id) => {
            let customer_id = customer_for_contact(conn, *id)?;
            Ok(ResolvedParty {
                customer_id,
                contact_id: Some(*id),
            })
        }
        PartyRef::NewContact(new_contact) => {
            let contact_id = create_contact(conn, new_contact)?;
            let customer_id = customer_for_contact(conn, contact_id)?;
            Ok(ResolvedParty {
                customer_id,
                contact_id: Some(contact_id),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::utils::test_conn;

    #[test]
    fn customer_for_contact_is_idempotent() {
        let conn = test_conn();
        let contact_id = create_contact(&conn, &NewContact::new("Dana")).unwrap();

        let first = customer_for_contact(&conn, contact_id).unwrap();
        let second = customer_for_contact(&conn, contact_id).unwrap();
        assert_eq!(first, second);

        let customer = get_customer(&conn, first).unwrap();
        assert_eq!(customer.name, "Dana");
        assert_eq!(customer.contact_id, Some(contact_id));
    }

    #[test]
    fn customer_for_unknown_contact_is_not_found() {
        let conn = test_conn();
        let err = customer_for_contact(&conn, 42).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn resolve_party_covers_every_reference_kind() {
        let conn = test_conn();

        let direct = create_customer(&conn, &NewCustomer::new("Sam")).unwrap();
        let resolved = resolve_party(&conn, &PartyRef::Customer(direct)).unwrap();
        assert_eq!(resolved.customer_id, direct);
        assert_eq!(resolved.contact_id, None);

        let contact_id = create_contact(&conn, &NewContact::new("Kim")).unwrap();
        let via_contact = resolve_party(&conn, &PartyRef::Contact(contact_id)).unwrap();
        assert_eq!(via_contact.contact_id, Some(contact_id));

        let inline = resolve_party(
            &conn,
            &PartyRef::NewContact(NewContact {
                platform: Some("marketplace".to_string()),
                handle: Some("@rivka".to_string()),
                ..NewContact::new("Rivka")
            }),
        )
        .unwrap();
        assert!(inline.contact_id.is_some());
        let contact = get_contact(&conn, inline.contact_id.unwrap()).unwrap();
        assert_eq!(contact.handle.as_deref(), Some("@rivka"));
    }

    #[test]
    fn blank_names_are_rejected() {
        let conn = test_conn();
        let err = create_contact(&conn, &NewContact::new("")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = create_customer(&conn, &NewCustomer::new(" ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
