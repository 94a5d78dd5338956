//! Wraps one host's container-runtime control API.

mod client;

pub use client::EngineClient;
