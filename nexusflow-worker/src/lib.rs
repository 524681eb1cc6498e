//! # NexusFlow Worker Library
//!
//! Background delivery of the email outbox written by the API: OTP codes,
//! welcome emails and task assignment notices.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `mailer`: delivery backends (log, HTTP relay)
//! - `orchestrator`: poll loop, bounded concurrency, periodic sweep
//! - `queue`: claims and outcomes on the `email_outbox` table

pub mod config;
pub mod mailer;
pub mod orchestrator;
pub mod queue;
