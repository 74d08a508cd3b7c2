//! Module-side endpoint: registers named tools and dispatches incoming
//! method calls over one transport.
//!
//! The serve loop is sequential within a single transport: one message is
//! handled to completion before the next is read. Servers that need
//! internal concurrency spawn it inside handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::WireError;
use crate::message::{method, Message, PROTOCOL_VERSION};
use crate::tool::{Prompt, Resource, Tool};
use crate::transport::Transport;

/// Tool server: one registry of tools/resources/prompts, served over one
/// transport at a time until it closes or a `shutdown` arrives.
pub struct ToolServer {
    name: String,
    version: String,
    tools: HashMap<String, Tool>,
    resources: HashMap<String, Resource>,
    prompts: HashMap<String, Prompt>,
    initialized: AtomicBool,
    running: AtomicBool,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: HashMap::new(),
            resources: HashMap::new(),
            prompts: HashMap::new(),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a tool. Names must be unique; re-registering a name
    /// replaces the previous tool with a warning.
    pub fn add_tool(&mut self, tool: Tool) {
        debug!(tool = %tool.name, "registered tool");
        if self.tools.insert(tool.name.clone(), tool).is_some() {
            warn!("replaced an already-registered tool");
        }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        if self
            .resources
            .insert(resource.uri.clone(), resource)
            .is_some()
        {
            warn!("replaced an already-registered resource");
        }
    }

    pub fn add_prompt(&mut self, prompt: Prompt) {
        if self.prompts.insert(prompt.name.clone(), prompt).is_some() {
            warn!("replaced an already-registered prompt");
        }
    }

    /// Runs until the transport closes or a `shutdown` request is handled.
    /// The transport is always closed on exit.
    pub async fn serve(&self, transport: Arc<dyn Transport>) -> Result<(), WireError> {
        self.running.store(true, Ordering::SeqCst);
        info!(server = %self.name, "tool server started");

        while self.running.load(Ordering::SeqCst) {
            let message = match transport.receive().await {
                Ok(m) => m,
                Err(e) if e.is_connection_lost() => {
                    info!(server = %self.name, "connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(server = %self.name, error = %e, "receive failed");
                    break;
                }
            };

            if let Some(reply) = self.handle_message(message).await {
                if let Err(e) = transport.send(&reply).await {
                    warn!(server = %self.name, error = %e, "send failed, stopping");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let _ = transport.close().await;
        info!(server = %self.name, "tool server stopped");
        Ok(())
    }

    /// Dispatches one incoming message. Returns the reply frame, or None
    /// for notifications.
    pub async fn handle_message(&self, message: Message) -> Option<Message> {
        let method_name = message.method.clone()?;
        let id = message.id.clone();
        // Notifications get no reply, whatever the outcome.
        let result = self.dispatch(&method_name, message.params).await;
        let id = id?;
        Some(match result {
            Ok(value) => Message::response(id, value),
            Err(e) => Message::error_response(Some(id), e.to_object()),
        })
    }

    async fn dispatch(&self, method_name: &str, params: Option<Value>) -> Result<Value, WireError> {
        match method_name {
            method::INITIALIZE => Ok(self.handle_initialize()),
            method::TOOLS_LIST => Ok(self.handle_tools_list()),
            method::TOOLS_CALL => self.handle_tools_call(params).await,
            method::RESOURCES_LIST => Ok(self.handle_resources_list()),
            method::RESOURCES_READ => self.handle_resources_read(params),
            method::PROMPTS_LIST => Ok(self.handle_prompts_list()),
            method::PROMPTS_GET => self.handle_prompts_get(params),
            method::PING => Ok(json!({})),
            method::SHUTDOWN => {
                self.running.store(false, Ordering::SeqCst);
                Ok(json!({}))
            }
            other => Err(WireError::method_not_found(other)),
        }
    }

    fn handle_initialize(&self) -> Value {
        self.initialized.store(true, Ordering::SeqCst);
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": true },
                "resources": { "listChanged": true },
                "prompts": { "listChanged": true },
            },
            "serverInfo": { "name": self.name, "version": self.version },
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<_> = self.tools.values().map(Tool::spec).collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, WireError> {
        let params = params.ok_or_else(|| WireError::invalid_params("missing parameters"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| WireError::invalid_params("missing tool name"))?;
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| WireError::invalid_params(format!("tool not found: {}", name)))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let value = tool.invoke(arguments).await.map_err(|e| match e {
            // Schema violations keep their code; handler failures map to internal.
            WireError::Rpc(obj) if obj.code == crate::error::CODE_INVALID_PARAMS => {
                WireError::Rpc(obj)
            }
            other => WireError::internal(format!("tool execution error: {}", other)),
        })?;

        Ok(json!({
            "content": [{ "type": "text", "text": stringify(&value) }]
        }))
    }

    fn handle_resources_list(&self) -> Value {
        let resources: Vec<_> = self.resources.values().collect();
        json!({ "resources": resources })
    }

    fn handle_resources_read(&self, params: Option<Value>) -> Result<Value, WireError> {
        let params = params.ok_or_else(|| WireError::invalid_params("missing parameters"))?;
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| WireError::invalid_params("missing uri"))?;
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| WireError::invalid_params(format!("resource not found: {}", uri)))?;
        Ok(json!({
            "contents": [{
                "uri": resource.uri,
                "mimeType": resource.mime_type.as_deref().unwrap_or("text/plain"),
                "text": resource.text.clone().unwrap_or_default(),
            }]
        }))
    }

    fn handle_prompts_list(&self) -> Value {
        let prompts: Vec<_> = self.prompts.values().collect();
        json!({ "prompts": prompts })
    }

    fn handle_prompts_get(&self, params: Option<Value>) -> Result<Value, WireError> {
        let params = params.ok_or_else(|| WireError::invalid_params("missing parameters"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| WireError::invalid_params("missing prompt name"))?;
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| WireError::invalid_params(format!("prompt not found: {}", name)))?;
        let text = prompt
            .template
            .clone()
            .unwrap_or_else(|| format!("Prompt: {}", prompt.name));
        Ok(json!({
            "description": prompt.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text },
            }]
        }))
    }

    /// Stops the serve loop after the in-flight message completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// Stringifies a handler return value into the single text content item of
/// a `tools/call` result. Strings pass through; other values are JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
