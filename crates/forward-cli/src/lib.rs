//! Forward CLI Library
//!
//! Shares a server running on localhost over the web: requests a tunnel
//! from the control API, opens an SSH reverse forward to the assigned
//! tunnel server and supervises it until exit.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod prompt;
pub mod supervisor;
pub mod transport;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testing;
