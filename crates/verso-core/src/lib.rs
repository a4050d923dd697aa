//! Core domain model for verso.
//!
//! This crate defines the song [`Document`](model::Document) model, the
//! identifier types shared by the search engine and the conversational
//! layer, and the SQLite-backed store for versioned engine artifacts.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod artifact;
pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};
