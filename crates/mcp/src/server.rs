//! MCP server: exposes a `ToolRegistry` over JSON-RPC.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use canary_core::{error_envelope, CanaryError};
use canary_tool_runtime::{ToolContext, ToolRegistry};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::*;

pub struct McpServer {
    registry: ToolRegistry,
    server_name: String,
    server_version: String,
    instructions: Option<String>,
    initialized: bool,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_name: "canary-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            initialized: false,
        }
    }

    /// Usage notes returned to the client from `initialize`.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Serve until the transport closes.
    pub async fn run<T: McpTransport>(&mut self, transport: &mut T) -> Result<(), McpError> {
        info!(server = %self.server_name, tools = self.registry.len(), "MCP server starting");

        while let Some(line) = transport.receive().await? {
            debug!(bytes = line.len(), "Received message");
            if let Some(response) = self.handle_line(&line).await {
                let json = serde_json::to_string(&response)?;
                transport.send(&json).await?;
            }
        }

        info!("Transport closed, shutting down");
        Ok(())
    }

    /// One inbound line to at most one response; notifications get none.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON");
                return Some(JsonRpcResponse::failure(
                    RpcId::Null,
                    McpError::JsonParse(e).to_rpc_error(),
                ));
            }
        };

        if raw.get("id").is_none() {
            match serde_json::from_value::<JsonRpcNotification>(raw) {
                Ok(notification) => self.handle_notification(&notification),
                Err(e) => debug!(error = %e, "Ignoring malformed notification"),
            }
            return None;
        }

        let id = raw
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RpcId>(id).ok())
            .unwrap_or(RpcId::Null);
        match serde_json::from_value::<JsonRpcRequest>(raw) {
            Ok(request) => Some(self.handle_request(&request).await),
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON-RPC request");
                Some(JsonRpcResponse::failure(
                    id,
                    McpError::InvalidRequest(e.to_string()).to_rpc_error(),
                ))
            }
        }
    }

    pub async fn handle_request(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request.params),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(&request.params).await,
            method => {
                warn!(method = %method, "Unknown method");
                Err(McpError::MethodNotFound(method.to_string()))
            }
        };
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(id, e.to_rpc_error()),
        }
    }

    fn handle_notification(&mut self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client confirmed initialization"),
            "notifications/cancelled" => debug!("Client cancelled a request"),
            method => debug!(method = %method, "Unknown notification, ignoring"),
        }
    }

    fn handle_initialize(&mut self, params: &Option<Value>) -> Result<Value, McpError> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p.clone())
                .map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => InitializeParams::default(),
        };
        info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = params.protocol_version.as_deref().unwrap_or("none"),
            "Handling initialize"
        );
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: Some(self.server_version.clone()),
            },
            instructions: self.instructions.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self) -> Result<Value, McpError> {
        let tools: Vec<ToolInfo> = self.registry.list().into_iter().map(ToolInfo::from).collect();
        debug!(count = tools.len(), "Handling tools/list");
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn handle_call_tool(&self, params: &Option<Value>) -> Result<Value, McpError> {
        let params = params
            .as_ref()
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
        let call: CallToolParams = serde_json::from_value(params.clone())
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;
        if !self.initialized {
            warn!(tool = %call.name, "tools/call before initialize");
        }

        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("tools/call", request_id = %request_id, tool = %call.name);
        let context = ToolContext::new(request_id);
        let started = Instant::now();

        let result = async {
            let result = match tool.execute(call.arguments, &context).await {
                Ok(result) => CallToolResult::from(result),
                Err(e) => {
                    warn!(error = %e, "Tool failed outside its envelope");
                    let envelope = error_envelope(&CanaryError::Internal(e.to_string()));
                    CallToolResult::text(envelope.to_string(), true)
                }
            };
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                is_error = result.is_error,
                "Tool call finished"
            );
            result
        }
        .instrument(span)
        .await;

        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use async_trait::async_trait;
    use canary_historian::SizeGuard;
    use canary_tool_runtime::{parse_input, Tool, ToolDefinition, ToolError, ToolResult};
    use serde::Deserialize;
    use serde_json::json;

    /// Looks a tag up in a fixed list.
    struct FixedLookup;

    #[derive(Deserialize)]
    struct LookupInput {
        path: String,
    }

    #[async_trait]
    impl Tool for FixedLookup {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "lookup".to_string(),
                description: "Look up a known tag".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"]
                }),
            }
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            let outcome = parse_input::<LookupInput>("lookup", input).and_then(|input| {
                if input.path == "Plant.Kiln6.ShellTemp" {
                    Ok(json!({ "path": input.path }))
                } else {
                    Err(CanaryError::tag_not_found(input.path, "Browse first"))
                }
            });
            ToolResult::from_outcome(outcome, &SizeGuard::new(10_000))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(FixedLookup).unwrap();
        McpServer::new(registry)
    }

    fn envelope_of(resp: &JsonRpcResponse) -> (Value, bool) {
        let result: CallToolResult = serde_json::from_value(resp.result.clone().unwrap()).unwrap();
        let ToolContent::Text { text } = &result.content[0];
        (serde_json::from_str(text).unwrap(), result.is_error)
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let mut server = server().with_instructions("Resolve tags before querying");
        let req = JsonRpcRequest::new(
            RpcId::Number(1),
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client"}
            })),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let result: InitializeResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.server_info.name, "canary-mcp");
        assert_eq!(result.instructions.as_deref(), Some("Resolve tags before querying"));
    }

    #[tokio::test]
    async fn test_handle_list_tools() {
        let mut server = server();
        let resp = server
            .handle_request(&JsonRpcRequest::new(RpcId::Number(2), "tools/list", None))
            .await;
        let result: ListToolsResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].name, "lookup");
    }

    #[tokio::test]
    async fn test_tool_errors_are_envelopes_not_rpc_errors() {
        let mut server = server();
        let req = JsonRpcRequest::new(
            RpcId::Number(3),
            "tools/call",
            Some(json!({"name": "lookup", "arguments": {"path": "Plant.Nowhere"}})),
        );

        let resp = server.handle_request(&req).await;
        assert!(resp.error.is_none());
        let (envelope, is_error) = envelope_of(&resp);
        assert!(is_error);
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"]["type"], "tag_not_found");
        assert_eq!(envelope["error"]["remediation"], "Browse first");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let mut server = server();
        let resp = server
            .handle_request(&JsonRpcRequest::new(
                RpcId::Number(4),
                "tools/call",
                Some(json!({"name": "nonexistent", "arguments": {}})),
            ))
            .await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);

        let resp = server
            .handle_request(&JsonRpcRequest::new(RpcId::Number(5), "resources/list", None))
            .await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_lines() {
        let mut server = server();

        let resp = server.handle_line("{not json").await.unwrap();
        assert_eq!(resp.id, RpcId::Null);
        assert_eq!(resp.error.unwrap().code, error_codes::PARSE_ERROR);

        let resp = server.handle_line(r#"{"jsonrpc":"2.0","id":7}"#).await.unwrap();
        assert_eq!(resp.id, RpcId::Number(7));
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);

        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_server_run_with_channel_transport() {
        let (mut client_side, mut server_side) = ChannelTransport::pair();
        let mut server = server();
        let handle = tokio::spawn(async move { server.run(&mut server_side).await });

        let init = JsonRpcRequest::new(RpcId::Number(1), "initialize", Some(json!({})));
        client_side.send(&serde_json::to_string(&init).unwrap()).await.unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client_side.receive().await.unwrap().unwrap()).unwrap();
        assert!(resp.error.is_none());

        client_side
            .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();

        let call = JsonRpcRequest::new(
            RpcId::String("c-1".into()),
            "tools/call",
            Some(json!({"name": "lookup", "arguments": {"path": "Plant.Kiln6.ShellTemp"}})),
        );
        client_side.send(&serde_json::to_string(&call).unwrap()).await.unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client_side.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(resp.id, RpcId::String("c-1".into()));
        let (envelope, is_error) = envelope_of(&resp);
        assert!(!is_error);
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["path"], "Plant.Kiln6.ShellTemp");

        drop(client_side);
        handle.await.unwrap().unwrap();
    }
}
