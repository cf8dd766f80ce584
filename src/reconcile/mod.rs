pub mod engine;
pub mod pool;
pub mod stale;

pub use engine::{EngineConfig, ReconcileEngine, RunPhase, TargetScope, UPDATE_CHUNK_SIZE};
pub use pool::{Completion, WorkerPool};
