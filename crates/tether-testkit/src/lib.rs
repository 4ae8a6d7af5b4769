//! Test doubles for the tether adapter
//!
//! A scripted, fully in-memory implementation of the `tether-engine`
//! boundary. Tests drive the peer side explicitly (remote opens, credit
//! grants, deliveries, transport accept limits) and then assert on what
//! the adapter did: bytes pushed, credit flowed, deliveries settled,
//! events dispatched.

pub mod engine;
pub mod log;

pub use engine::*;
pub use log::*;
