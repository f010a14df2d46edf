//! In-memory backends for exercising discovery, selection and forwarding
//! without a network.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::BackendSpec;
use crate::registry::Connector;

use super::{
    AsyncFragmentIterator, BackendClient, Error, ErrorKind, ModelDescriptor, Operation, Reply,
};

pub(crate) struct FakeBackend {
    name: String,
    models: Mutex<Vec<ModelDescriptor>>,
    unreachable: AtomicBool,
    listings: AtomicUsize,
    listing_delay: Option<Duration>,
    fragments: Vec<Value>,
    fail_after: Option<usize>,
    forwarded: Mutex<Vec<(Operation, Map<String, Value>)>>,
}

impl FakeBackend {
    pub(crate) fn serving(name: &str, models: &[&str]) -> FakeBackend {
        FakeBackend {
            name: name.to_string(),
            models: Mutex::new(models.iter().map(|m| ModelDescriptor::named(*m)).collect()),
            unreachable: AtomicBool::new(false),
            listings: AtomicUsize::new(0),
            listing_delay: None,
            fragments: Vec::new(),
            fail_after: None,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    /// Streamed replies yield these fragments in order.
    pub(crate) fn with_fragments(mut self, fragments: Vec<Value>) -> FakeBackend {
        self.fragments = fragments;
        self
    }

    /// Model listings take `delay` to answer.
    pub(crate) fn answering_after(mut self, delay: Duration) -> FakeBackend {
        self.listing_delay = Some(delay);
        self
    }

    /// Streamed replies break off with an error after `n` fragments.
    pub(crate) fn failing_after(mut self, n: usize) -> FakeBackend {
        self.fail_after = Some(n);
        self
    }

    pub(crate) fn set_models(&self, models: &[&str]) {
        *self.models.lock().unwrap() = models.iter().map(|m| ModelDescriptor::named(*m)).collect();
    }

    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// How many times the model list was requested.
    pub(crate) fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub(crate) fn forwarded(&self) -> Vec<(Operation, Map<String, Value>)> {
        self.forwarded.lock().unwrap().clone()
    }
}

struct FakeFragments {
    fragments: VecDeque<Value>,
    remaining_before_failure: Option<usize>,
}

#[async_trait]
impl AsyncFragmentIterator for FakeFragments {
    async fn next(&mut self) -> Option<Result<Value, Error>> {
        if let Some(remaining) = self.remaining_before_failure.as_mut() {
            if *remaining == 0 {
                self.remaining_before_failure = None;
                self.fragments.clear();
                return Some(Err(Error::from_kind(ErrorKind::Connection)));
            }
            *remaining -= 1;
        }

        self.fragments.pop_front().map(Ok)
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn models(&self) -> Result<Vec<ModelDescriptor>, Error> {
        self.listings.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::from_kind(ErrorKind::Connection));
        }

        Ok(self.models.lock().unwrap().clone())
    }

    async fn forward(
        &self,
        op: Operation,
        body: Map<String, Value>,
        stream: bool,
    ) -> Result<Reply, Error> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::from_kind(ErrorKind::Connection));
        }

        let model = body.get("model").cloned().unwrap_or(Value::Null);
        self.forwarded.lock().unwrap().push((op, body));

        if stream && op.can_stream() {
            Ok(Reply::Streamed(Box::new(FakeFragments {
                fragments: self.fragments.iter().cloned().collect(),
                remaining_before_failure: self.fail_after,
            })))
        } else {
            Ok(Reply::Whole(json!({
                "model": model,
                "backend": self.name,
                "done": true,
            })))
        }
    }
}

/// A set of fake backends addressed by their normalised address.
#[derive(Default, Clone)]
pub(crate) struct FakeFleet {
    backends: Arc<Mutex<HashMap<String, Arc<FakeBackend>>>>,
}

impl FakeFleet {
    pub(crate) fn new() -> FakeFleet {
        FakeFleet::default()
    }

    pub(crate) fn add(&self, address: &str, backend: FakeBackend) -> Arc<FakeBackend> {
        let backend = Arc::new(backend);

        self.backends
            .lock()
            .unwrap()
            .insert(address.to_string(), backend.clone());

        backend
    }

    pub(crate) fn get(&self, address: &str) -> Option<Arc<FakeBackend>> {
        self.backends.lock().unwrap().get(address).cloned()
    }

    /// Connects to fleet members by address. Addresses outside the fleet
    /// fail as if nothing listened there.
    pub(crate) fn connector(&self) -> Connector {
        let fleet = self.clone();

        Arc::new(move |spec: &BackendSpec| {
            fleet
                .get(&spec.address)
                .map(|backend| backend as Arc<dyn BackendClient>)
                .ok_or_else(|| Error::from_kind(ErrorKind::Connection))
        })
    }
}
