//! Configuration management for portsight.
//!
//! Provides XDG-compliant paths and the JSON settings file.

mod settings;

pub use settings::{AppSettings, Paths};
