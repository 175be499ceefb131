//! # vidcast-server
//!
//! Captures frames, encodes them and streams them to every connected
//! viewer. Each viewer gets its own bounded buffer, so a slow viewer
//! loses frames without holding back the others.

pub mod config;
pub mod service;
