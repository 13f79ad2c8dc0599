//! Operations built on top of the processor and the catalog.
//!
//! ## Available Services
//!
//! - [`browse`] - Paged, filtered listings served through the cursor cache
//! - [`sync`] - Catalog vs. disk reconciliation and mtime backfill

pub mod browse;
pub mod sync;
