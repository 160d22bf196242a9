//! Warden - Admission-Controlled Dispatch Core
//!
//! This crate implements the cross-cutting core of a device management
//! platform: a fixed-window rate limiter guarding operations, a handler
//! registry routing queue and topic messages to exactly one handler, and a
//! resolver that picks the device command service for a protocol type.

pub mod clock;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ratelimit;
