//! Integration tests - full request resolution against the in-memory executor
//!
//! Each test builds a fresh store, resolves one request through
//! `RequestParser` and checks both the response and the store afterwards.

mod common;
mod crud_tests;
mod mutation_tests;
mod query_tests;
