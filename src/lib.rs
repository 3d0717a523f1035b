pub mod client;
pub mod data;
pub mod email;
pub mod encryption;
pub mod error;
pub mod models;
pub mod stats;
pub mod utils;
