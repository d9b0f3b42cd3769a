//! Configuration, message models and queue policy

pub mod config;
pub mod models;
pub mod policy;
