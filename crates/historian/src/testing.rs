//! Scripted transport for exercising the core without a historian.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::resilience::SESSION_ENDPOINT;
use crate::transport::{HistorianTransport, TransportError};

type Reply = Result<Value, TransportError>;

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    requests: Vec<(String, Value)>,
}

/// Replies are consumed per endpoint in the order they were scripted; once
/// a queue is empty the endpoint's `always` reply (if any) is used. Anything
/// else answers HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every session exchange with a fresh token.
    pub fn with_session(self) -> Self {
        self.always(SESSION_ENDPOINT, json!({"sessionToken": "test-session", "statusCode": "Good"}))
    }

    pub fn respond(self, endpoint: &str, body: Value) -> Self {
        self.push(endpoint, Ok(body))
    }

    pub fn fail(self, endpoint: &str, error: TransportError) -> Self {
        self.push(endpoint, Err(error))
    }

    pub fn always(self, endpoint: &str, body: Value) -> Self {
        self.lock().fallback.insert(endpoint.to_string(), Ok(body));
        self
    }

    pub fn always_fail(self, endpoint: &str, error: TransportError) -> Self {
        self.lock().fallback.insert(endpoint.to_string(), Err(error));
        self
    }

    fn push(self, endpoint: &str, reply: Reply) -> Self {
        self.lock()
            .queued
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Bodies sent to one endpoint, oldest first.
    pub fn requests(&self, endpoint: &str) -> Vec<Value> {
        self.lock()
            .requests
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.lock().requests.iter().filter(|(e, _)| e == endpoint).count()
    }

    /// Every request to any endpoint, session exchanges included.
    pub fn total_calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Requests other than session exchanges.
    pub fn data_calls(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|(e, _)| e != SESSION_ENDPOINT)
            .count()
    }
}

#[async_trait]
impl HistorianTransport for ScriptedTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TransportError> {
        let mut script = self.lock();
        script.requests.push((endpoint.to_string(), body.clone()));
        if let Some(reply) = script.queued.get_mut(endpoint).and_then(VecDeque::pop_front) {
            return reply;
        }
        match script.fallback.get(endpoint) {
            Some(reply) => reply.clone(),
            None => Err(TransportError::Status {
                status: 404,
                body: format!("no scripted reply for {}", endpoint),
            }),
        }
    }
}
