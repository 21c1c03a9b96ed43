//! Core types, config, errors, and the command protocol for doodlebot.

pub mod command;
pub mod config;
pub mod error;
pub mod session;
pub mod types;
