//! Key/value persistence for quiz progress.

pub mod repository;
pub mod sqlite;
