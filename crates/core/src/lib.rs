//! Classbook Core - Shared types library.
//!
//! This crate provides common types used across all Classbook components:
//! - `client` - Session manager, transport and class API
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, user profiles, class records and statuses
//! - [`validation`] - Form validation that runs before any network call
//! - [`calendar`] - Week arithmetic for the calendar view

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod calendar;
pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{Field, ValidationError, ValidationReason};
