// src/lib.rs
//! Automated job application service: accepts submissions, records them and
//! drives a browser through the target site's apply flow, reporting every
//! stage back over a status callback.

pub mod auth;
pub mod automation;
pub mod browser;
pub mod cli;
pub mod config;
pub mod core;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod secret;
pub mod web;

pub use config::AppConfig;
pub use web::start_web_server;
