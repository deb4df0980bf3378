pub mod adapters;
pub mod http_client;
pub mod meta;
pub mod runtime;
