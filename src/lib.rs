pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod preprocessing;
pub mod web;

pub use config::Config;
pub use error::{LeadError, Result};
