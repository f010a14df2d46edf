use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::descriptor::BackendDescriptor;
use super::discovery::{discover, DiscoveryReport};
use super::index::{Lookup, ModelIndex};
use super::Connector;
use crate::config::{BackendSource, BackendSpec};

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum Error {
    /// No configured backend serves the model, even after a refresh
    #[error("model \"{0}\" not found on any configured backend")]
    ModelNotFound(String),
    #[error("model name must not be empty")]
    EmptyModelName,
}

/// The state published by one discovery pass.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    generation: u64,
    specs: Vec<BackendSpec>,
    backends: Vec<Arc<BackendDescriptor>>,
    index: ModelIndex,
}

impl Snapshot {
    /// Increases by one with every completed discovery pass.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Backends in configuration order.
    pub(crate) fn backends(&self) -> &[Arc<BackendDescriptor>] {
        &self.backends
    }

    pub(crate) fn index(&self) -> &ModelIndex {
        &self.index
    }
}

pub(crate) struct Registry {
    source: BackendSource,
    connector: Connector,
    current: RwLock<Arc<Snapshot>>,
    // Held for the whole of a discovery pass
    refreshing: Mutex<()>,
}

impl Registry {
    /// An empty registry. Nothing is known until the first
    /// [`Registry::refresh`].
    pub(crate) fn new(source: BackendSource, connector: Connector) -> Registry {
        Registry {
            source,
            connector,
            current: RwLock::new(Arc::new(Snapshot::default())),
            refreshing: Mutex::new(()),
        }
    }

    pub(crate) async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Runs a discovery pass and publishes its result.
    pub(crate) async fn refresh(&self) -> DiscoveryReport {
        let _guard = self.refreshing.lock().await;

        self.discover().await
    }

    /// Runs a discovery pass unless one completed after `generation` was
    /// observed, in which case its result is used instead.
    pub(crate) async fn refresh_after(&self, generation: u64) {
        let _guard = self.refreshing.lock().await;

        if self.snapshot().await.generation > generation {
            tracing::debug!("a discovery pass finished while waiting, reusing it");
            return;
        }

        self.discover().await;
    }

    // Callers hold `refreshing`
    async fn discover(&self) -> DiscoveryReport {
        let previous = self.snapshot().await;

        let specs = match self.source.load().await {
            Ok(specs) => specs,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load the backend set, keeping the previous one");
                previous.specs.clone()
            }
        };

        let (backends, report) = discover(&specs, &previous.backends, &self.connector).await;
        let index = ModelIndex::build(&backends);

        report.log(index.len());

        let next = Arc::new(Snapshot {
            generation: previous.generation + 1,
            specs,
            backends,
            index,
        });

        *self.current.write().await = next;

        report
    }

    /// Chooses a backend serving `model`. An unknown model triggers one
    /// discovery pass before it is reported as not found.
    pub(crate) async fn select(&self, model: &str) -> Result<Arc<BackendDescriptor>, Error> {
        if model.is_empty() {
            return Err(Error::EmptyModelName);
        }

        let snapshot = self.snapshot().await;

        if let Some(backend) = pick(&snapshot, model) {
            return Ok(backend);
        }

        tracing::debug!(model, "model is not indexed, refreshing");
        self.refresh_after(snapshot.generation).await;

        let snapshot = self.snapshot().await;

        pick(&snapshot, model).ok_or_else(|| Error::ModelNotFound(model.to_string()))
    }

    /// Refreshes every `interval` until the returned task is aborted.
    pub(crate) fn spawn_periodic_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // The first tick completes immediately
            ticks.tick().await;

            loop {
                ticks.tick().await;
                self.refresh().await;
            }
        })
    }
}

fn pick(snapshot: &Snapshot, model: &str) -> Option<Arc<BackendDescriptor>> {
    match snapshot.index.lookup(model) {
        Lookup::Found(backends) => {
            tracing::debug!(
                model,
                candidates = ?backends.iter().map(|b| b.address.as_str()).collect::<Vec<_>>(),
                "model is served by"
            );

            let chosen = choose(backends, &mut rand::thread_rng()).clone();
            tracing::info!(model, backend = %chosen.id, address = %chosen.address, "chose backend");

            Some(chosen)
        }
        Lookup::NotFound => None,
    }
}

/// Picks one of `backends` uniformly at random. `backends` must not be empty,
/// which holds for every set found in a [`ModelIndex`].
pub(crate) fn choose<'b, R: Rng + ?Sized>(
    backends: &'b [Arc<BackendDescriptor>],
    rng: &mut R,
) -> &'b Arc<BackendDescriptor> {
    &backends[rng.gen_range(0..backends.len())]
}
