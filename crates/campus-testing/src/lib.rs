//! Test utilities for Campus services.
//!
//! Provides the JSON fixture loader used to feed raw legacy documents into
//! engine and cache tests.
//! Import in `#[cfg(test)]` blocks and `tests/` only, never in production code.

pub mod fixture;
