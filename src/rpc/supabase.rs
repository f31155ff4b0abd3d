use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::SalesBackend;
use crate::config::Config;
use crate::error::FetchError;
use crate::logging::{log_rpc_call, log_rpc_failure};

/// PostgREST-style RPC over HTTP: `POST {base}/rest/v1/rpc/{procedure}`.
pub struct SupabaseBackend {
    client: Client,
    base: String,
    anon_key: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SupabaseBackend {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(cfg.request_timeout()).build()?;
        Ok(Self {
            client,
            base: cfg.rpc_base(),
            anon_key: cfg.anon_key.clone(),
        })
    }

    fn url(&self, procedure: &str) -> String {
        format!("{}/{}", self.base, procedure)
    }

    fn error_message(body: &str) -> String {
        match serde_json::from_str::<PostgrestError>(body) {
            Ok(PostgrestError { code, message: Some(msg) }) => match code {
                Some(code) => format!("{} ({})", msg, code),
                None => msg,
            },
            _ => body.to_string(),
        }
    }
}

#[async_trait]
impl SalesBackend for SupabaseBackend {
    async fn call(&self, procedure: &str, params: &Map<String, Value>) -> Result<Value, FetchError> {
        log_rpc_call(procedure, params);

        let mut req = self.client.post(self.url(procedure)).json(params);
        if let Some(key) = &self.anon_key {
            req = req.header("apikey", key).bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            log_rpc_failure(procedure, &e.to_string());
            FetchError::Transport {
                procedure: procedure.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| FetchError::Transport {
            procedure: procedure.to_string(),
            message: format!("read body failed: {}", e),
        })?;

        if !status.is_success() {
            let message = Self::error_message(&body);
            log_rpc_failure(procedure, &message);
            return Err(FetchError::Remote {
                procedure: procedure.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        // void/null procedures come back with an empty body
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| FetchError::decode(procedure, e))
    }
}
