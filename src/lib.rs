//! Loginguard - Login Attempt Throttling
//!
//! This crate tracks failed logins per normalized username and blocks a user
//! temporarily once too many failures land inside a sliding window. Two tiers
//! are checked (5 failures in 15 minutes, 10 failures in an hour by default).
//! State lives in a pluggable key-value store and every transition is
//! reported to an audit sink.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
