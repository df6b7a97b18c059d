//! Model Context Protocol client: the stdio transport, tool discovery and
//! tool execution.

pub mod catalog;
pub mod operations;
pub(crate) mod protocol;
pub mod transport;
