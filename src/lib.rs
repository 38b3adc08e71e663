pub mod app;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod worker;
