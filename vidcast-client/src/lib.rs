//! # vidcast-client
//!
//! Connects to a vidcast server, decodes the frame stream and hands
//! frames to the display. Lost connections are re-established with a
//! bounded number of attempts.

pub mod config;
pub mod display;
pub mod viewer;
