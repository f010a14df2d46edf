//! An umbrella module for the Ollama backend

mod api;
mod client;

pub(crate) use self::client::OllamaBackend;
