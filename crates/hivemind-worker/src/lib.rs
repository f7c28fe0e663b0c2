//! HiveMind Worker Library
//!
//! Worker agents are independent actors. Each one heartbeats on the bus,
//! reports resource samples to the aggregator and polls the dispatcher,
//! handing every task it receives to an [`Executor`].

pub mod agent;
pub mod executor;
pub mod fleet;
pub mod memory;
pub mod probe;
pub mod stats;

pub use agent::{TaskOutcome, WorkerAgent, WorkerDeps, WorkerHandle};
pub use executor::{Executor, ExecutorError, SimulatedExecutor};
pub use fleet::Fleet;
pub use memory::{InMemoryStore, MemoryConfig, MemoryError, MemoryItem, MemoryStore, MemoryTier};
pub use probe::{FixedProbe, ResourceProbe, SystemProbe};
pub use stats::TaskStats;
