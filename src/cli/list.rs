mod table;

use serde::Serialize;
use table::Table;

use crate::die;
use crate::registry::{Registry, Snapshot};
use crate::{ListArgs, ListObject, ListingFormat};

#[derive(Serialize)]
struct ModelListing {
    model: String,
    size: Option<u64>,
    backends: Vec<String>,
}

impl From<Vec<ModelListing>> for Table {
    fn from(value: Vec<ModelListing>) -> Self {
        let mut tab = Table::with_header(vec!["MODEL", "SIZE", "BACKENDS"]);

        for model in value {
            tab.add_row(vec![
                model.model,
                match model.size {
                    Some(size) => human_size(size),
                    None => "unknown".to_string(),
                },
                model.backends.join(","),
            ]);
        }

        tab
    }
}

#[derive(Serialize)]
struct BackendListing {
    id: String,
    address: String,
    status: String,
    models: usize,
}

impl From<Vec<BackendListing>> for Table {
    fn from(value: Vec<BackendListing>) -> Self {
        let mut tab = Table::with_header(vec!["ID", "ADDRESS", "MODELS", "STATUS"]);

        for backend in value {
            tab.add_row(vec![
                backend.id,
                backend.address,
                backend.models.to_string(),
                backend.status,
            ]);
        }

        tab
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{}B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = UNITS[0];

    for candidate in UNITS {
        size /= 1000.0;
        unit = candidate;

        if size < 1000.0 {
            break;
        }
    }

    format!("{:.1}{}", size, unit)
}

fn models(snapshot: &Snapshot) -> Vec<ModelListing> {
    snapshot
        .index()
        .entries()
        .into_iter()
        .map(|entry| ModelListing {
            model: entry.model.name.clone(),
            size: entry.model.size_bytes,
            backends: entry.backends.iter().map(|b| b.id.clone()).collect(),
        })
        .collect()
}

fn backends(snapshot: &Snapshot) -> Vec<BackendListing> {
    snapshot
        .backends()
        .iter()
        .map(|backend| BackendListing {
            id: backend.id.clone(),
            address: backend.address.clone(),
            status: backend.status.to_string(),
            models: backend.served_models.len(),
        })
        .collect()
}

fn format_output<O: Into<Table> + Serialize>(object: O, format: ListingFormat) {
    match format {
        ListingFormat::Json => match serde_json::to_string_pretty(&object) {
            Ok(output) => println!("{}", output),
            Err(err) => die!("failed to serialize the listing: {}", err),
        },
        ListingFormat::Table => {
            let tab: Table = object.into();

            print!("{}", tab);
        }
        ListingFormat::HeaderlessTable => {
            let mut tab: Table = object.into();

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}

/// Runs one discovery pass and prints what it found.
pub(crate) async fn list_cmd(registry: &Registry, args: &ListArgs) {
    registry.refresh().await;

    let snapshot = registry.snapshot().await;

    match args.object {
        ListObject::Models => format_output(models(&snapshot), args.format),
        ListObject::Backends => format_output(backends(&snapshot), args.format),
    }
}
