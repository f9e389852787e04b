//! studio-server: HTTP backend for the architecture studio.
//!
//! Persists projects, their requirements and knowledge bases, and the
//! outputs of agent runs. A run is triggered over HTTP and executes in
//! the background on the studio-agents pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod runner;
pub mod server;
pub mod web;
