//! A fake [`CrmBackend`] that records calls and returns canned envelopes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crmpilot_core::BoxFuture;
use crmpilot_core::crm::{CrmBackend, Mail, success};
use serde_json::{Value, json};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    /// Trait method name, e.g. `"query"`.
    pub op: &'static str,
    pub args: Value,
}

#[derive(Default)]
struct Inner {
    calls: Vec<BackendCall>,
    canned: HashMap<&'static str, VecDeque<Value>>,
}

/// Records every call. Unless a response was queued with
/// [`RecordingBackend::respond`], each call succeeds with empty data.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the envelope returned by the next call to `op`.
    pub fn respond(&self, op: &'static str, envelope: Value) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .canned
            .entry(op)
            .or_default()
            .push_back(envelope);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Names of the operations called, in order.
    pub fn ops(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.iter().map(|c| c.op).collect()
    }

    fn record(&self, op: &'static str, args: Value) -> BoxFuture<'_, Value> {
        let envelope = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(BackendCall { op, args });
            inner
                .canned
                .get_mut(op)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| success(json!({ "data": [] })))
        };
        Box::pin(async move { envelope })
    }
}

impl CrmBackend for RecordingBackend {
    fn get_fields(&self, module: String, datatypes: Vec<String>) -> BoxFuture<'_, Value> {
        self.record("get_fields", json!({ "module": module, "datatypes": datatypes }))
    }

    fn query(&self, coql: String) -> BoxFuture<'_, Value> {
        self.record("query", json!({ "query": coql }))
    }

    fn create_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value> {
        self.record("create_records", json!({ "module": module, "payload": payload }))
    }

    fn update_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value> {
        self.record("update_records", json!({ "module": module, "payload": payload }))
    }

    fn convert_lead(&self, record_id: String, payload: Value) -> BoxFuture<'_, Value> {
        self.record("convert_lead", json!({ "record_id": record_id, "payload": payload }))
    }

    fn send_mail(&self, mail: Mail) -> BoxFuture<'_, Value> {
        self.record(
            "send_mail",
            json!({ "to": mail.to, "subject": mail.subject, "html": mail.html }),
        )
    }

    fn list_modules(&self) -> BoxFuture<'_, Value> {
        self.record("list_modules", json!({}))
    }

    fn get_record(&self, module: String, record_id: String) -> BoxFuture<'_, Value> {
        self.record("get_record", json!({ "module": module, "record_id": record_id }))
    }

    fn create_task(&self, payload: Value) -> BoxFuture<'_, Value> {
        self.record("create_task", json!({ "payload": payload }))
    }
}
