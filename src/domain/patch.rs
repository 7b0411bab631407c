// src/domain/patch.rs
//
// Field-level diffs for partial updates. A caller builds a patch carrying
// only the fields it means to change; everything else stays `Keep` and the
// stored value wins when the update function merges. `Patch<Option<T>>`
// distinguishes setting, clearing and leaving a nullable column.

use chrono::NaiveDate;

/// One field of a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the stored value as it is.
    Keep,
    /// Replace the stored value.
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    /// Merges this field over the stored value.
    pub fn resolve(self, current: T) -> T {
        match self {
            Patch::Keep => current,
            Patch::Set(value) => value,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }
}

/// Partial update of an item's descriptive fields. Status and the listing
/// flag are owned by the managers and cannot be patched here.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Patch<String>,
    pub category_id: Patch<Option<i64>>,
    pub location: Patch<Option<String>>,
    pub acquired_at: Patch<Option<NaiveDate>>,
    pub acquired_from: Patch<Option<String>>,
    pub acquisition_cost_cents: Patch<Option<i64>>,
    pub notes: Patch<Option<String>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        !(self.name.is_set()
            || self.category_id.is_set()
            || self.location.is_set()
            || self.acquired_at.is_set()
            || self.acquired_from.is_set()
            || self.acquisition_cost_cents.is_set()
            || self.notes.is_set())
    }
}

/// Corrections to a finalized sale: price, date and free-text details only.
#[derive(Debug, Clone, Default)]
pub struct SalePatch {
    pub price_cents: Patch<i64>,
    pub sale_date: Patch<NaiveDate>,
    pub notes: Patch<Option<String>>,
    pub handover_note: Patch<Option<String>>,
}

impl SalePatch {
    pub fn is_empty(&self) -> bool {
        !(self.price_cents.is_set()
            || self.sale_date.is_set()
            || self.notes.is_set()
            || self.handover_note.is_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_resolves_to_stored_value() {
        let field: Patch<i64> = Patch::Keep;
        assert_eq!(field.resolve(250), 250);
    }

    #[test]
    fn set_wins_over_stored_value() {
        assert_eq!(Patch::Set(900).resolve(250), 900);
        // Clearing a nullable column is Set(None), not Keep.
        assert_eq!(Patch::Set(None).resolve(Some("old".to_string())), None);
    }

    #[test]
    fn default_patch_changes_nothing() {
        let patch = ItemPatch::default();
        assert!(patch.is_empty());

        let patch = ItemPatch {
            location: Patch::Set(Some("shelf B".to_string())),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
