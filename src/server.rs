//! The HTTP boundary. Requests are routed to a backend chosen by the
//! [`Registry`](crate::registry::Registry) and the backend's reply is relayed
//! either as a single JSON document or as newline-delimited JSON.

mod error;
mod handlers;
mod routes;
mod streaming;

pub(crate) use self::handlers::AppState;
pub(crate) use self::routes::router;

use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::net::TcpListener;

use crate::backends::Operation;

/// Serves until Ctrl-C is received. In-flight requests are allowed to finish.
pub(crate) async fn serve(state: Arc<AppState>, listen: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;

    tracing::info!("listening on http://{}", listener.local_addr()?);
    for op in Operation::iter() {
        tracing::info!("  POST {} - routed by model", op.path());
    }
    tracing::info!("  GET  /api/tags - models and the backends serving them");
    tracing::info!("  GET  /api/backends - backend discovery status");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "cannot listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
