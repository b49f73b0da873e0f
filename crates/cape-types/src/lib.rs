//! Core types and traits for the CAPE agent federation.
//!
//! This crate defines the data shared by the directory client, routing
//! engine, wire protocol and state stores: credentials, data sources,
//! configuration, the error enum and the persistence trait. It contains no
//! business logic.

pub mod config;
pub mod credential;
pub mod datasource;
pub mod error;
pub mod memory;
