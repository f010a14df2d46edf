use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use super::descriptor::{BackendDescriptor, BackendStatus};
use super::Connector;
use crate::backends::ModelDescriptor;
use crate::config::BackendSpec;

/// The outcome of one discovery pass.
#[derive(Debug, Default)]
pub(crate) struct DiscoveryReport {
    /// Ids of the backends which answered.
    pub reachable: Vec<String>,
    /// Ids of the backends which did not answer, with the reason.
    pub unreachable: Vec<(String, String)>,
}

impl DiscoveryReport {
    pub(crate) fn log(&self, models: usize) {
        tracing::info!(
            reachable = self.reachable.len(),
            unreachable = self.unreachable.len(),
            models,
            "discovery finished"
        );
    }
}

/// Asks every backend in `specs` for its models, all at once. A backend that
/// does not answer within its discovery timeout keeps whatever it reported in
/// `previous`. Backends absent from `specs` are dropped.
pub(crate) async fn discover(
    specs: &[BackendSpec],
    previous: &[Arc<BackendDescriptor>],
    connector: &Connector,
) -> (Vec<Arc<BackendDescriptor>>, DiscoveryReport) {
    let probes = specs.iter().map(|spec| {
        let known = previous
            .iter()
            .find(|backend| backend.address == spec.address)
            .cloned();

        probe(spec, known, connector)
    });

    let outcomes = join_all(probes).await;

    let mut backends = Vec::with_capacity(outcomes.len());
    let mut report = DiscoveryReport::default();

    for (spec, (descriptor, outcome)) in specs.iter().zip(outcomes) {
        match outcome {
            Ok(models) => {
                tracing::debug!(backend = %spec.id, address = %spec.address, models, "backend answered");
                report.reachable.push(spec.id.clone());
            }
            Err(reason) => {
                tracing::warn!(backend = %spec.id, address = %spec.address, %reason, "backend did not answer");
                report.unreachable.push((spec.id.clone(), reason));
            }
        }

        if let Some(descriptor) = descriptor {
            backends.push(Arc::new(descriptor));
        }
    }

    (backends, report)
}

async fn probe(
    spec: &BackendSpec,
    known: Option<Arc<BackendDescriptor>>,
    connector: &Connector,
) -> (Option<BackendDescriptor>, Result<usize, String>) {
    let client = match &known {
        Some(backend) => backend.client.clone(),
        None => match connector(spec) {
            Ok(client) => client,
            Err(err) => return (None, Err(err.to_string())),
        },
    };

    let listing = match tokio::time::timeout(spec.discovery_timeout, client.models()).await {
        Ok(Ok(models)) => Ok(models),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("no answer within {:?}", spec.discovery_timeout)),
    };

    let (served_models, status, outcome) = match listing {
        Ok(models) => {
            let models = distinct(models);
            let count = models.len();

            (models, BackendStatus::Ready, Ok(count))
        }
        Err(reason) => match known {
            Some(backend) if !backend.served_models.is_empty() => (
                backend.served_models.clone(),
                BackendStatus::Stale {
                    reason: reason.clone(),
                },
                Err(reason),
            ),
            _ => (
                Vec::new(),
                BackendStatus::Unreachable {
                    reason: reason.clone(),
                },
                Err(reason),
            ),
        },
    };

    let descriptor = BackendDescriptor {
        id: spec.id.clone(),
        address: spec.address.clone(),
        client,
        served_models,
        status,
    };

    (Some(descriptor), outcome)
}

// Backends occasionally list a tag twice
fn distinct(models: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    let mut seen = HashSet::new();

    models
        .into_iter()
        .filter(|model| seen.insert(model.name.clone()))
        .collect()
}
