//! Request fingerprints and the pending-request registry
//!
//! Every dispatched request (unless flagged never-cancel) owns a slot in the
//! [`PendingRegistry`] keyed by its [`PendingKey`]. Dispatching a request
//! whose key is already present cancels the older one first, so within one
//! key the last dispatched request wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::http::descriptor::RequestDescriptor;

/// Which request fields make up the fingerprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelRule {
    /// URL only
    Path,
    /// URL and method
    Method,
    /// URL, method, params and body
    #[default]
    Full,
}

impl CancelRule {
    /// Parse a header value; unknown values select the full rule
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "path" => CancelRule::Path,
            "method" => CancelRule::Method,
            _ => CancelRule::Full,
        }
    }
}

/// Deterministic request fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey(String);

impl PendingKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fingerprint a descriptor under its own cancel rule
    pub fn of(descriptor: &RequestDescriptor) -> Self {
        compute_key(descriptor, descriptor.directives.cancel_rule)
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with object keys sorted at every depth
fn canonical(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(fields) => {
                let mut entries: Vec<_> = fields.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Derive the fingerprint of `descriptor` under `rule`
pub fn compute_key(descriptor: &RequestDescriptor, rule: CancelRule) -> PendingKey {
    let mut parts = vec![format!("path:{}", descriptor.url)];
    if matches!(rule, CancelRule::Method | CancelRule::Full) {
        parts.push(format!("method:{}", descriptor.method));
    }
    if rule == CancelRule::Full {
        let params = Value::Object(
            descriptor
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        let body = descriptor
            .body
            .as_ref()
            .map(|b| b.normalized())
            .unwrap_or(Value::Null);
        parts.push(format!("params:{}", canonical(&params)));
        parts.push(format!("data:{}", canonical(&body)));
    }
    PendingKey(parts.join(";"))
}

/// Identifies the registry slot owned by one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTicket {
    pub key: PendingKey,
    id: u64,
}

/// Sending half of a cancellation, owned by the registry
#[derive(Debug)]
struct CancelHandle {
    id: u64,
    sender: oneshot::Sender<String>,
}

impl CancelHandle {
    fn cancel(self, reason: &str) {
        // The request may already have finished and dropped its signal
        let _ = self.sender.send(reason.to_string());
    }
}

/// Receiving half of a cancellation, held by the in-flight request
#[derive(Debug)]
pub struct CancelSignal {
    receiver: oneshot::Receiver<String>,
}

impl CancelSignal {
    /// The cancellation reason, if the request was already cancelled
    pub fn try_reason(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Resolve with the cancellation reason once cancelled
    ///
    /// If the registry drops the slot without cancelling, this never resolves.
    pub async fn cancelled(self) -> String {
        match self.receiver.await {
            Ok(reason) => reason,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Registry of in-flight requests and their cancel handles
///
/// Cloning yields another handle onto the same registry, so clients share
/// cancellation state only when built from the same instance.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    slots: Arc<Mutex<HashMap<PendingKey, CancelHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PendingKey, CancelHandle>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `key`
    ///
    /// Returns `None` for never-cancel requests and when the slot is already
    /// taken; the first registration keeps it.
    pub fn register(
        &self,
        key: &PendingKey,
        never_cancel: bool,
    ) -> Option<(PendingTicket, CancelSignal)> {
        if never_cancel {
            return None;
        }

        let mut slots = self.slots();
        if slots.contains_key(key) {
            debug!(key = %key, "pending slot already taken");
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        slots.insert(key.clone(), CancelHandle { id, sender });
        debug!(key = %key, id, "registered pending request");

        Some((
            PendingTicket { key: key.clone(), id },
            CancelSignal { receiver },
        ))
    }

    /// Cancel and remove the request holding `key`, passing the key as reason
    pub fn cancel_and_clear(&self, key: &PendingKey) -> bool {
        let handle = self.slots().remove(key);
        match handle {
            Some(handle) => {
                info!(key = %key, "cancelling superseded request");
                handle.cancel(key.as_str());
                true
            }
            None => false,
        }
    }

    /// Take over the slot for `key`, cancelling whichever request held it
    ///
    /// The removal, cancellation and insertion happen under one lock, so two
    /// concurrent dispatches of the same key always end with exactly one slot
    /// and the loser cancelled.
    pub fn supersede(&self, key: &PendingKey) -> (PendingTicket, CancelSignal) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        let mut slots = self.slots();
        if let Some(previous) = slots.insert(key.clone(), CancelHandle { id, sender }) {
            info!(key = %key, "cancelling superseded request");
            previous.cancel(key.as_str());
        }
        drop(slots);
        debug!(key = %key, id, "registered pending request");

        (
            PendingTicket { key: key.clone(), id },
            CancelSignal { receiver },
        )
    }

    /// Drop the slot owned by `ticket` without cancelling
    ///
    /// A newer request that took over the same key keeps its slot.
    pub fn release(&self, ticket: &PendingTicket) {
        let mut slots = self.slots();
        if slots.get(&ticket.key).is_some_and(|h| h.id == ticket.id) {
            slots.remove(&ticket.key);
            debug!(key = %ticket.key, id = ticket.id, "released pending request");
        }
    }

    /// Cancel every pending request and empty the registry
    pub fn clear_all(&self) -> usize {
        let drained: Vec<_> = self.slots().drain().collect();
        let count = drained.len();
        for (key, handle) in drained {
            handle.cancel(key.as_str());
        }
        count
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.slots().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}
