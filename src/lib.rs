//! apitree - declarative JSON query resolution
//!
//! A client sends a nested JSON document naming the tables and rows it wants
//! and how they relate; apitree resolves it into a response of the same
//! shape. The crate provides:
//! - Request key grammar and method model (`request`)
//! - Query descriptors and the in-memory executor (`executor`)
//! - Tree resolution: references, arrays, joins, transactions (`resolver`)
//! - Content and access verification (`verifier`)
//! - HTTP server (`server`)

pub mod config;
pub mod executor;
pub mod request;
pub mod resolver;
pub mod server;
pub mod verifier;
