//! `sessionmux` streams
//!
//! Turns one shared transport into many independent duplex sessions:
//! - [`ChannelContext`]: per-session read/write/close feeds
//! - [`LocalEventBus`]: address-scoped fan-out of connection events
//! - [`ServerStreamProcessorFactory`]: demultiplexes inbound traffic by sender
//!   identity and announces one [`StreamProcessor`] per session
//!
//! Data flow:
//! ```text
//! RemoteStreamSource ──read──▶ factory (demux by id) ──▶ ChannelContext ──▶ StreamProcessor
//! RemoteStreamSource ──closed─▶ LocalEventBus (by address) ──▶ ChannelContext::close
//! StreamProcessor::on_next ──▶ write feed ──▶ factory (re-tag sender id) ──▶ RemoteStreamSource::send
//! ```

pub mod channel;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod factory;
pub mod memory;
pub mod processor;
pub mod source;
mod subject;

pub use channel::{ChannelContext, ChannelRegistry};
pub use error::StreamError;
pub use event::{Event, EventStream};
pub use event_bus::LocalEventBus;
pub use factory::{FactoryStats, ServerStreamProcessorFactory};
pub use memory::MemoryServerStream;
pub use processor::StreamProcessor;
pub use source::RemoteStreamSource;
