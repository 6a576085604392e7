//! Scanguard - Admission control for an expensive scan pipeline
//!
//! This crate decides, per client, whether a request may run the costly
//! OCR and generative analysis path. Each client gets a sliding request
//! window that escalates into a longer block when exceeded, plus a
//! cooldown after every completed scan. State is in-memory and local to
//! the process; a periodic reaper bounds its size.

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
