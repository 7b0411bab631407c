// src/domain/party.rs

use serde::{Deserialize, Serialize};

/// The one way callers name the transacting party. Exactly one variant is
/// always present, so "neither an id nor a contact payload was supplied"
/// cannot be expressed where a party is required — operations that allow an
/// absent party take an `Option<PartyRef>` and make the fallback explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyRef {
    /// An existing customer record.
    Customer(i64),
    /// An existing contact record; its customer is materialized on first use.
    Contact(i64),
    /// A person met for the first time: the contact record is created, then
    /// the customer derived from it.
    NewContact(NewContact),
}

/// Raw external-platform identity captured on first contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    /// Marketplace or channel the person appeared on ("ebay", "facebook", ...).
    pub platform: Option<String>,
    /// Username, profile URL or phone number on that platform.
    pub handle: Option<String>,
    pub note: Option<String>,
}

impl NewContact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: None,
            handle: None,
            note: None,
        }
    }
}

/// Input for creating a customer directly, without going through a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub note: Option<String>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: None,
            email: None,
            note: None,
        }
    }
}

/// What the resolver hands back: the canonical transacting party, plus the
/// contact it came through when the reference was contact-based. Reservations
/// persist the contact id; rentals and sales persist the customer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedParty {
    pub customer_id: i64,
    pub contact_id: Option<i64>,
}
