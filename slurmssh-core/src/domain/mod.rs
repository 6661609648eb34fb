//! Core domain types
//!
//! These types describe the remote endpoint, the files shipped to it and the
//! jobs submitted there. They are shared between the library (which acts on
//! them) and the CLI (which parses and prints them).

pub mod job;
pub mod log;
pub mod sync;
pub mod target;
