//! Domain types - core business entities
//!
//! This module contains the canonical domain types used throughout the application.
//! These types represent the repository rules and are independent of persistence
//! or IPC concerns.

pub mod config;
pub mod owner;
pub mod package;
pub mod version;
