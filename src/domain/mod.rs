//! Core domain types and logic.

pub mod alert;
pub mod asset;
pub mod backfill;
pub mod changes;
pub mod config_validation;
pub mod error;
pub mod health;
pub mod icons;
pub mod importer;
pub mod indicators;
pub mod market;
pub mod portfolio;
pub mod positions;
pub mod prices;
pub mod repair;
pub mod resolver;
pub mod rules;
pub mod settings;
pub mod timestamp;
pub mod valuation;
