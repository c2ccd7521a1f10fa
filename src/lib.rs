pub mod auth;
pub mod config;
pub mod error;
pub mod pack;
pub mod registry;
pub mod store;
pub mod version;
