//! # NexusFlow API Server Library
//!
//! REST endpoints and the chat socket for the NexusFlow collaboration
//! backend.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: environment configuration
//! - `error`: error type and HTTP response mapping
//! - `middleware`: security headers and rate limiting
//! - `realtime`: chat hub and WebSocket connections
//! - `routes`: route handlers
//! - `storage`: attachment files on disk

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod storage;
