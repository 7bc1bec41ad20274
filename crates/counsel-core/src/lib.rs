pub mod catalog;
pub mod confidence;
pub mod config;
pub mod db;
pub mod documents;
pub mod keywords;
pub mod memory;
pub mod router;
pub mod session;
pub mod store;
pub mod types;

pub use types::*;
