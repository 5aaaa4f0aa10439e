pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod image;
pub mod models;
pub mod server;
