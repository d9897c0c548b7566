//! Integration test suite for the Satchel account engine.
//!
//! Tests drive [`satchel_account::AccountEngine`] end to end through
//! in-memory collaborators from [`helpers`], and check selection and
//! key-encoding invariants with property tests.

pub mod helpers;
