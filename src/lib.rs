//! Relay core for near-real-time trade copying: ingress demultiplexing,
//! the authoritative runtime-status machine, the copy engine and the
//! config distribution surface. Exposed as a library for the integration
//! tests; the binary lives in `main.rs`.

pub mod api;
pub mod config;
pub mod config_feed;
pub mod connection_manager;
pub mod copy_engine;
pub mod db;
pub mod log_buffer;
pub mod message_handler;
pub mod models;
pub mod port_resolver;
pub mod status;
pub mod wire;
pub mod zeromq;
