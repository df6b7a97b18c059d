//! repolens is a terminal assistant that answers questions about GitHub
//! repositories through a GitHub MCP tool server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] speaks the Model Context Protocol to the tool server over stdio
//!   and loads its paginated tool catalog.
//! - [`core`] owns configuration, the read-only tool policy, the model-driven
//!   tool loop, failure sanitization, turn dispatch and the session store.
//! - [`ui`] runs the line-oriented chat loop.
//! - [`api`] defines the chat completion payloads sent to the model endpoint.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod ui;
pub mod utils;
