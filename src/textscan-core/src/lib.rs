//! Textscan Core Library
//!
//! Configuration, logging and event plumbing for the textscan CLI.

pub mod colored_logger;
pub mod config;
pub mod events;
pub mod interrupt;
