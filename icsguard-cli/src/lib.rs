//! icsguard CLI library.
//!
//! The binary (`icsguard`) is a thin wrapper; command handlers live here so
//! they can be exercised from integration tests.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
