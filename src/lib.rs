pub mod app;
pub mod cli;
pub mod config;
pub mod global;
pub mod platform;
pub mod recorder;
pub mod tools;
