pub mod adapters;
pub mod config;
pub mod context;
pub mod logging;
pub mod migration;
pub mod models;
pub mod monitor;
pub mod persistence;
pub mod registry;
pub mod sqlite;
pub mod validation;
pub mod versioning;
