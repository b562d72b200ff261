//! Shared library for the outreach core services
//!
//! Provides the common error type, configuration resolution, database
//! initialization and row models, webhook signature verification, and
//! session token utilities used by the API service.

pub mod config;
pub mod db;
pub mod error;
pub mod token;
pub mod webhook;

pub use error::{Error, Result};
