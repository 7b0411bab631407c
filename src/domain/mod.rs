pub mod party;
pub mod patch;
pub mod status;

pub use party::{NewContact, NewCustomer, PartyRef, ResolvedParty};
pub use patch::{ItemPatch, Patch, SalePatch};
pub use status::{
    derive_display_status, EndDisposition, ItemStatus, ListingStatus, RentalStatus,
    ReservationStatus, ReserveType,
};
