//! Registry-facing half of the aggregation core: the operator and quorum
//! state a message task validates against, the per-digest aggregation state
//! and the aggregate handed to verifiers.

pub mod aggregation;
pub mod interfaces;
pub mod memory;
pub mod registry;

pub use aggregation::{AggregatedOperators, AggregationStatus, MessageBlsAggregation};
pub use interfaces::{
    CheckSignaturesIndices, OperatorAvsState, OperatorId, QuorumAvsState, QuorumNumber,
    QuorumThresholdPercentage, RegistryError, RegistryResult, RegistrySource, StakeAmount,
};
pub use memory::{InMemoryRegistry, RegistrySnapshot};
pub use registry::ValidationInfo;
