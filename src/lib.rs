//! nvrd - embedded network video recorder, HTTP control surface.
//!
//! Core library for the asynchronous connection engine: accept, parse,
//! route, offload, respond.

pub mod config;
pub mod handlers;
pub mod http;
pub mod proxy;
pub mod router;
pub mod server;
