//! # Storage Module
//!
//! Durable attribute storage using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (one committed transaction per attribute write)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)

mod redb_attributes;

pub use redb_attributes::RedbAttributes;
