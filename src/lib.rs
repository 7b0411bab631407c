// src/lib.rs

pub mod db;
pub mod domain;
pub mod errors;

#[cfg(test)]
mod tests;

pub use db::Database;
pub use errors::{OpResult, StoreError};
