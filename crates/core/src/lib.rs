//! Domain types and pure logic for the Task Master backend.
//!
//! This crate has **zero I/O dependencies**: records, validation, the row
//! codec, CSV text encoding, version tokens, and list queries all operate
//! on in-memory values. Persistence lives in `taskmaster-db`.

pub mod codec;
pub mod csv;
pub mod error;
pub mod project;
pub mod query;
pub mod types;
pub mod user;
pub mod version;
