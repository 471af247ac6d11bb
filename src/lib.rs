pub mod cli;
pub mod config;
pub mod harvest;
pub mod merge;
pub mod models;
pub mod reddit;
pub mod retry;
pub mod store;
pub mod throttle;
pub mod times;
