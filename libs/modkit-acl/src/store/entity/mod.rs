//! `SeaORM` entities of the permission store.
//!
//! The rewriter joins these tables by their literal names, so table and column
//! names are part of the store's external contract.

pub mod class;
pub mod entry;
pub mod object_identity;
pub mod security_identity;
