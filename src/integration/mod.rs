//! Integration tests
//!
//! End-to-end tests of the upload endpoint, driven through the real router
//! with media fixtures synthesised on the fly.

#![cfg(test)]

pub mod e2e;
pub mod fixtures;
