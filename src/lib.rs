pub mod bot;
pub mod config;
pub mod keepalive;
pub mod llm;
pub mod metrics;
pub mod utils;
pub mod web;
