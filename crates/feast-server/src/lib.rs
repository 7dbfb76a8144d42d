//! HTTP front end for online feature serving.

pub mod http;
pub mod loader;
