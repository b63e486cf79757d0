//! In-memory seat inventory ledger for a fixed catalogue of trips, served
//! over the Postgres wire protocol.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod model;
pub mod observability;
pub mod sql;
pub mod wire;
