// 🧪 In-process fakes for the collaborator traits, shared by unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::enrichment::{EnrichmentProvider, EnrichmentService, LookupHints, ProviderResult};
use crate::entities::{CanonicalLead, Provider};
use crate::error::{Result, SyncError};
use crate::field_map::FieldMap;
use crate::rpc::{IntegrationRpc, RpcOperation};
use crate::status::ScoringHook;
use crate::webhook::{WebhookConfig, WebhookPayload, WebhookSender};

#[derive(Clone)]
enum Scripted {
    Respond(Value),
    Fail(String),
    AuthRequired,
}

/// RPC fake: canned answers per operation, records every call
#[derive(Default)]
pub struct ScriptedRpc {
    script: HashMap<RpcOperation, Scripted>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Provider, RpcOperation, Value)>>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        ScriptedRpc::default()
    }

    pub fn respond(mut self, operation: RpcOperation, value: Value) -> Self {
        self.script.insert(operation, Scripted::Respond(value));
        self
    }

    pub fn fail(mut self, operation: RpcOperation, message: &str) -> Self {
        self.script
            .insert(operation, Scripted::Fail(message.to_string()));
        self
    }

    pub fn fail_auth(mut self, operation: RpcOperation) -> Self {
        self.script.insert(operation, Scripted::AuthRequired);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Provider, RpcOperation, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrationRpc for ScriptedRpc {
    async fn call(
        &self,
        _tenant_id: &str,
        provider: Provider,
        operation: RpcOperation,
        data: Value,
    ) -> Result<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push((provider, operation, data));

        match self.script.get(&operation).cloned() {
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::Fail(message)) => Err(SyncError::external(provider.as_str(), message)),
            Some(Scripted::AuthRequired) => Err(SyncError::ExternalAuthRequired {
                provider: provider.to_string(),
            }),
            None => Ok(json!({"success": true})),
        }
    }
}

/// Webhook fake recording deliveries
#[derive(Default)]
pub struct RecordingSender {
    failing: bool,
    delay: Option<Duration>,
    sent: Mutex<Vec<(WebhookConfig, WebhookPayload)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        RecordingSender::default()
    }

    pub fn failing() -> Self {
        RecordingSender {
            failing: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<(WebhookConfig, WebhookPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, config: &WebhookConfig, payload: &WebhookPayload) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(SyncError::external("webhook", "503 Service Unavailable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((config.clone(), payload.clone()));
        Ok(())
    }
}

/// Scoring fake returning a fixed delta or failing
pub struct FixedScoring {
    delta: Option<i64>,
}

impl FixedScoring {
    pub fn delta(delta: i64) -> Self {
        FixedScoring { delta: Some(delta) }
    }

    pub fn failing() -> Self {
        FixedScoring { delta: None }
    }
}

#[async_trait]
impl ScoringHook for FixedScoring {
    async fn score_delta(
        &self,
        _lead: &CanonicalLead,
        _previous: Option<&str>,
        _current: &str,
        _map: &FieldMap,
    ) -> Result<i64> {
        self.delta
            .ok_or_else(|| SyncError::Storage("score settings unavailable".to_string()))
    }
}

/// Enrichment provider returning the same result every time
pub struct StaticProvider {
    service: EnrichmentService,
    pub result: ProviderResult,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(service: EnrichmentService, result: ProviderResult) -> Self {
        StaticProvider {
            service,
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentProvider for StaticProvider {
    fn service(&self) -> EnrichmentService {
        self.service
    }

    async fn lookup(&self, _hints: &LookupHints) -> Result<ProviderResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent lookups interleave before the quota is consumed
        tokio::task::yield_now().await;
        Ok(self.result.clone())
    }
}
