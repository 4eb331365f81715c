//! # UI Module
//!
//! Text rendering of pipeline events for the console monitor.

pub mod cent_meter;
pub mod event_line;
