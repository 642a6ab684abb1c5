//! Core types for Classbook.
//!
//! This module provides type-safe wrappers for the domain concepts exchanged
//! with the class server.

pub mod class;
pub mod email;
pub mod id;
pub mod status;
pub mod user;

pub use class::{ClassRecord, NewClass, Reservation};
pub use email::{Email, EmailError};
pub use id::*;
pub use status::ClassStatus;
pub use user::UserProfile;
