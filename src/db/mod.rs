// src/db/mod.rs

pub mod connection;
pub mod contacts;
pub mod items;
pub mod listings;
pub mod rentals;
pub mod reservations;
pub mod sales;

pub use connection::Database;
