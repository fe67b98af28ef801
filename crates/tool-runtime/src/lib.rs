pub mod registry;
pub mod services;
pub mod tool;
pub mod tools;

pub use registry::{RegistryError, ToolRegistry};
pub use services::CanaryServices;
pub use tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};
pub use tools::{
    register_all, BrowseTagsTool, CacheInvalidateTool, GetLastValueTool, GetTagMetadataTool,
    QueryTimeseriesTool, ResolveTagTool, SearchCatalogTool, ServiceHealthTool,
};
