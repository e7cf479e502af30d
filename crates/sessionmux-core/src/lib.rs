//! `sessionmux` Core Library
//!
//! Shared building blocks for the session multiplexer:
//! - Immutable message envelope and qualifier helpers
//! - Opaque network addresses
//! - Configuration resolution and hierarchy
//! - Tracing initialization
//! - Common error types

pub mod address;
pub mod config;
pub mod error;
pub mod message;
pub mod qualifier;
pub mod tracing_init;

pub use address::Address;
pub use config::Config;
pub use error::{Error, Result};
pub use message::{StreamMessage, StreamMessageBuilder};
pub use qualifier::Qualifier;
