use std::sync::Arc;

use crate::config::Config;
use crate::die;
use crate::registry::Registry;
use crate::server::{self, AppState};
use crate::ServeArgs;

pub(crate) async fn serve_cmd(config: &Config, registry: Arc<Registry>, args: &ServeArgs) {
    // Discovery failures are never fatal; a miss will trigger another pass
    let report = registry.refresh().await;

    if report.reachable.is_empty() {
        tracing::warn!("no backend answered the initial discovery");
    } else if !report.unreachable.is_empty() {
        let silent: Vec<&str> = report.unreachable.iter().map(|(id, _)| id.as_str()).collect();
        tracing::warn!(backends = ?silent, "some backends did not answer the initial discovery");
    }

    let refresher = config.discovery.refresh_interval().map(|interval| {
        tracing::info!(?interval, "refreshing the model index periodically");

        registry.clone().spawn_periodic_refresh(interval)
    });

    let listen = args
        .listen
        .clone()
        .unwrap_or_else(|| config.server.listen.clone());

    let state = Arc::new(AppState::new(
        registry,
        config.forwarding.stream_idle_timeout(),
    ));

    if let Err(err) = server::serve(state, &listen).await {
        die!("failed to serve on \"{}\": {}", listen, err);
    }

    if let Some(refresher) = refresher {
        refresher.abort();
    }
}
