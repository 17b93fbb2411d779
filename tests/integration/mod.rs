//! Integration tests for flatten-image
//!
//! These exercise the compiled binary: its command-line surface, and a full run
//! against a scripted stand-in for the engine CLI. Tests against a real engine
//! live in `docker` and only build with the `docker` feature.

pub mod cli;
pub mod docker;
