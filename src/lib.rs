//! studyplan-sync - Study plan item propagation and reconciliation
//!
//! This crate provides:
//! - An engine that places new learning objectives and assignments into every master
//!   and copy study plan of their book, without duplicating items on replays
//! - Schedule imports that edit item dates and reach linked copy items
//! - A SQLite store for the catalog, study plans, items and task history
//! - CLI commands for loading catalogs, applying events and inspecting plans

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod meta;
pub mod model;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
