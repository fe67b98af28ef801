//! MCP server for the Canary historian tools.
//!
//! JSON-RPC 2.0 over newline-delimited stdio. Every `tools/call` answers
//! with one text block holding the tool's JSON envelope.
//!
//! ```no_run
//! use canary_mcp::{McpServer, StdioTransport};
//! use canary_tool_runtime::ToolRegistry;
//!
//! # async fn example() {
//! let mut server = McpServer::new(ToolRegistry::new());
//! let mut transport = StdioTransport::new();
//! server.run(&mut transport).await.unwrap();
//! # }
//! ```

pub mod error;
pub mod server;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use server::McpServer;
pub use transport::{ChannelTransport, McpTransport, StdioTransport};
pub use types::*;
