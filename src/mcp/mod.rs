//! MCP tool-RPC surface: JSON-RPC 2.0 over line-framed stdio

pub mod protocol;
pub mod tools;
