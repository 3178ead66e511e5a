//! Adapters to the outside world: the provider's HTTP API and payment state storage.

pub mod http_client;
pub mod in_memory;
