//! Unit tests - public building blocks exercised outside a full resolution

mod join_tests;
mod request_tests;
mod verification_tests;
