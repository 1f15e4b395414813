pub mod actors;
pub mod assembler;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod types;
