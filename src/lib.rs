//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service` and, through it, the desktop bridges and
//! mirror providers). Hosts can depend on `note-mirror-workspace` and enable
//! `desktop-shims` without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service;
