//! `omnisearch-mcp` library surface.
//!
//! The `omnisearch` binary (CLI + MCP stdio) is the main entrypoint. Configuration loading and
//! provider registration live here so they can be reused and tested without the transport.

pub mod config;
pub mod registry;
