#![doc = include_str!("../README.md")]

pub mod broker;
mod config;
mod error;
pub mod handoff;
mod item;
pub mod pipeline;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::item::*;
pub use crate::pipeline::{
    balancer::{Balancer, BalancerReport},
    dispatcher::{Dispatcher, DispatcherStats},
    orchestrator::{Orchestrator, PipelineReport},
    producer::{Producer, ProducerStats},
    reader::{ConsumedRecord, Reader, ReaderStats},
};
pub use tokio_util::sync::CancellationToken;
