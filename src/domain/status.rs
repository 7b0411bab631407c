// src/domain/status.rs
//
// Every status enum in the data model, plus the transition table for item
// statuses. Columns are stored as text; the ToSql/FromSql impls keep an
// undefined value from ever crossing into the program — a bad stored status
// surfaces as a read error instead of an invalid state.

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! text_enum_storage {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("unexpected {} value '{s}'", stringify!($ty)).into(),
                    )
                })
            }
        }
    };
}

/// Stored lifecycle status of an item. `overdue` is deliberately absent —
/// it is a display value derived from an active rental's expected end, see
/// [`derive_display_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InStock,
    Listed,
    Reserved,
    Rented,
    Sold,
    Disposed,
}

text_enum_storage!(ItemStatus {
    InStock => "in_stock",
    Listed => "listed",
    Reserved => "reserved",
    Rented => "rented",
    Sold => "sold",
    Disposed => "disposed",
});

impl ItemStatus {
    /// Sources of the `-> listed` transition; also the statuses in which the
    /// listing flag may be toggled at all.
    pub const LISTABLE: [ItemStatus; 3] = [Self::InStock, Self::Reserved, Self::Listed];

    /// Sources of the `-> reserved` transition.
    pub const RESERVABLE: [ItemStatus; 2] = [Self::InStock, Self::Listed];

    /// Sources of the `-> rented` transition. `reserved` is legal only
    /// because starting the rental converts the active reservation in the
    /// same transaction.
    pub const RENTABLE: [ItemStatus; 3] = [Self::InStock, Self::Listed, Self::Reserved];

    /// Sources of the `-> sold` transition.
    pub const SELLABLE: [ItemStatus; 3] = [Self::InStock, Self::Reserved, Self::Listed];

    /// Sources of the explicit `-> disposed` transition. A rented item can
    /// only be disposed through ending its rental.
    pub const DISPOSABLE: [ItemStatus; 3] = [Self::InStock, Self::Listed, Self::Reserved];
}

/// Status of a marketplace listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    NeedsUpdate,
    Closed,
}

text_enum_storage!(ListingStatus {
    Active => "active",
    NeedsUpdate => "needs_update",
    Closed => "closed",
});

/// Status of a reservation hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Cancelled,
    Converted,
}

text_enum_storage!(ReservationStatus {
    Active => "active",
    Cancelled => "cancelled",
    Converted => "converted",
});

/// What a reservation is holding the item for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveType {
    Sale,
    Rental,
}

text_enum_storage!(ReserveType {
    Sale => "sale",
    Rental => "rental",
});

/// Status of a rental lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Active,
    Ended,
}

text_enum_storage!(RentalStatus {
    Active => "active",
    Ended => "ended",
});

/// The only two statuses an item may take when its rental ends. Using a
/// dedicated enum means `end_rental` cannot be handed, say, `sold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndDisposition {
    InStock,
    Disposed,
}

impl EndDisposition {
    pub fn item_status(self) -> ItemStatus {
        match self {
            Self::InStock => ItemStatus::InStock,
            Self::Disposed => ItemStatus::Disposed,
        }
    }
}

/// Derives the status string shown to people, which is the stored status
/// except for one case: a rented item whose active rental is past its
/// expected end reads as "overdue". Overdue is never written back to the
/// item row.
pub fn derive_display_status(
    status: ItemStatus,
    expected_end: Option<NaiveDate>,
    today: NaiveDate,
) -> &'static str {
    if status == ItemStatus::Rented {
        if let Some(end) = expected_end {
            if end < today {
                return "overdue";
            }
        }
    }
    status.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn unknown_status_text_does_not_parse() {
        assert_eq!(ItemStatus::parse("overdue"), None);
        assert_eq!(ItemStatus::parse(""), None);
        assert_eq!(ItemStatus::parse("in_stock"), Some(ItemStatus::InStock));
    }

    #[test]
    fn rented_past_expected_end_displays_overdue() {
        let display = derive_display_status(
            ItemStatus::Rented,
            Some(d("2026-03-01")),
            d("2026-03-02"),
        );
        assert_eq!(display, "overdue");
    }

    #[test]
    fn rented_on_or_before_expected_end_displays_rented() {
        let on_the_day =
            derive_display_status(ItemStatus::Rented, Some(d("2026-03-01")), d("2026-03-01"));
        assert_eq!(on_the_day, "rented");

        let early =
            derive_display_status(ItemStatus::Rented, Some(d("2026-03-01")), d("2026-02-20"));
        assert_eq!(early, "rented");
    }

    #[test]
    fn non_rented_statuses_never_display_overdue() {
        // Even with a stale expected end attached, only rented derives.
        let display = derive_display_status(
            ItemStatus::Reserved,
            Some(d("2020-01-01")),
            d("2026-03-02"),
        );
        assert_eq!(display, "reserved");
    }
}
