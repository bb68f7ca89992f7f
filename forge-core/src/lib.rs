pub mod apps;
pub mod cancel;
pub mod chat;
pub mod config;
pub mod containers;
pub mod error;
pub mod http_client;
pub mod model;
pub mod normalizer;
pub mod poll;
pub mod sse;
pub mod stream;
pub mod telemetry;
