// src/tests/mod.rs

pub mod utils;
