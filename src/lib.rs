pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod quiz;
pub mod scheduler;
pub mod srs;
pub mod stats;

pub use error::{Result, SrsError};
