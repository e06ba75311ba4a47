//! BLS signature aggregation for SFFL messages.
//!
//! [`AggregationService`] runs one task per message key. Each task collects
//! signatures until the signed stake of one digest satisfies the round's
//! thresholds, then emits [`AggregationResponse`]s on a single stream.
//! [`CheckpointAssembler`] commits finalized messages into checkpoint trees.

pub mod checkpoint;
pub mod error;
pub mod persist;
pub mod service;
pub mod signed;
mod task;

pub use checkpoint::{start_round, CheckpointAssembler, CheckpointAssembly, CheckpointTrees};
pub use error::{AggregatorError, AggregatorResult, CheckpointError, CheckpointResult, ResponseError};
pub use persist::persist_response;
pub use service::AggregationService;
pub use signed::{AggregationResponse, SignedMessage};
