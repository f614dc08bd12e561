//! Scripted in-memory transport for session and script tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use toolcall_core::{ChannelError, ConnectionError, Transport};

/// Everything the mock saw.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    pub connects: usize,
    pub closes: usize,
    /// Request methods in order.
    pub methods: Vec<String>,
    pub notifications: Vec<String>,
    /// `tools/call` name and arguments in order.
    pub calls: Vec<(String, Value)>,
}

impl MockLog {
    /// Names of the tools called, in order.
    pub fn tools(&self) -> Vec<&str> {
        self.calls.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Arguments of the first call to `tool`.
    pub fn arguments(&self, tool: &str) -> Option<&Value> {
        self.calls
            .iter()
            .find(|(name, _)| name == tool)
            .map(|(_, args)| args)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Result(Value),
    Fault(String),
}

/// Transport answering `tools/call` from a fixed table.
///
/// Tools without an entry answer with an empty content list.
#[derive(Clone, Default)]
pub struct MockTransport {
    log: Arc<Mutex<MockLog>>,
    replies: BTreeMap<String, Reply>,
    fail_connect: bool,
    fail_handshake: bool,
}

impl MockTransport {
    /// Answer `tool` with `value` encoded as the text payload.
    pub fn tool_json(self, tool: &str, value: &Value) -> Self {
        self.tool_text(tool, &value.to_string())
    }

    /// Answer `tool` with a raw text payload.
    pub fn tool_text(self, tool: &str, text: &str) -> Self {
        self.tool_result(tool, json!({ "content": [{ "type": "text", "text": text }] }))
    }

    /// Answer `tool` with a raw `tools/call` result.
    pub fn tool_result(mut self, tool: &str, result: Value) -> Self {
        self.replies.insert(tool.to_string(), Reply::Result(result));
        self
    }

    /// Answer `tool` with a JSON-RPC error.
    pub fn tool_fault(mut self, tool: &str, message: &str) -> Self {
        self.replies
            .insert(tool.to_string(), Reply::Fault(message.to_string()));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_handshake(mut self) -> Self {
        self.fail_handshake = true;
        self
    }

    /// Snapshot of the log.
    pub fn log(&self) -> MockLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.log.lock().unwrap().connects += 1;
        if self.fail_connect {
            return Err(ConnectionError::Unreachable {
                endpoint: "mock://remote".to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let mut log = self.log.lock().unwrap();
        log.methods.push(method.to_string());

        match method {
            "initialize" if self.fail_handshake => Err(ChannelError::Closed),
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "mock-server", "version": "1.0.0" }
            })),
            "tools/list" => {
                let tools: Vec<Value> = self
                    .replies
                    .keys()
                    .map(|name| json!({ "name": name, "description": format!("Mock {name}") }))
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or_default().to_string();
                log.calls.push((name.clone(), params["arguments"].clone()));
                match self.replies.get(&name) {
                    Some(Reply::Result(result)) => Ok(result.clone()),
                    Some(Reply::Fault(message)) => Err(ChannelError::Remote {
                        code: -32602,
                        message: message.clone(),
                        data: None,
                    }),
                    None => Ok(json!({ "content": [] })),
                }
            }
            other => Err(ChannelError::Remote {
                code: -32601,
                message: format!("Method not found: {other}"),
                data: None,
            }),
        }
    }

    async fn notify(&self, method: &str, _params: Value) -> Result<(), ChannelError> {
        self.log.lock().unwrap().notifications.push(method.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}
