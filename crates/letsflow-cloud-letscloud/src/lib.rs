//! LetsCloud gateway for LetsFlow
//!
//! HTTP implementation of the engine's `Gateway` trait over the LetsCloud
//! REST API (`api-token` header, `{success, data, message}` envelope), plus
//! [`connect`], which picks the real or the in-memory gateway from settings.

pub mod client;
pub mod connect;
pub mod error;

pub use client::{LETSCLOUD_API_BASE, LetsCloudGateway};
pub use connect::{connect, probe};
pub use error::{LetsCloudError, Result};
