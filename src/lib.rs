//! Notification Hub - real-time and durable notification delivery.
//!
//! This crate takes domain events (task, comment and workspace changes) and
//! notification records and gets them to every interested client: over live
//! WebSocket connections, across server instances through a pub/sub broker,
//! and through a retried, rate-limited email channel.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
