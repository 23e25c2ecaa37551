pub mod accounts;
pub mod app;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod services;
