use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::time::Duration;

use super::SalesBackend;
use crate::error::FetchError;

type Responder = dyn Fn(&str, &Map<String, Value>) -> Result<Value, FetchError> + Send + Sync;
type Delay = dyn Fn(&str, &Map<String, Value>) -> Duration + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub procedure: String,
    pub params: Map<String, Value>,
}

impl RecordedCall {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// In-memory backend that answers from a closure and records every call.
/// Used for offline runs and tests.
pub struct FixtureBackend {
    responder: Box<Responder>,
    delay: Option<Box<Delay>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FixtureBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> Result<Value, FetchError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with an empty result set.
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(Value::Array(Vec::new())))
    }

    /// Hold each response for a per-call duration before answering.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, procedure: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.procedure == procedure)
            .collect()
    }
}

#[async_trait]
impl SalesBackend for FixtureBackend {
    async fn call(&self, procedure: &str, params: &Map<String, Value>) -> Result<Value, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                procedure: procedure.to_string(),
                params: params.clone(),
            });
        }
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(procedure, params)).await;
        }
        (self.responder)(procedure, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_calls() {
        let backend = FixtureBackend::new(|proc, _| Ok(json!({ "proc": proc })));
        let mut params = Map::new();
        params.insert("p_brand".to_string(), json!("Acme"));
        let out = backend.call("get_filtered_brands", &params).await.unwrap();
        assert_eq!(out["proc"], "get_filtered_brands");
        let calls = backend.calls_to("get_filtered_brands");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].param("p_brand"), Some("Acme"));
    }
}
