//! Connection management for the relational store backing every Batch and
//! Task. This crate has no knowledge of batch/task semantics; it only knows
//! how to stand up and retry a PostgreSQL connection pool.

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult};
