mod actors;
pub mod archive;
pub mod config;
pub mod error;
pub mod job;
pub mod options;
pub mod runtime;
pub mod supervisor;
pub mod types;
pub mod workspace;

// re-export the actor handle as if it is the orchestrator itself.
pub use actors::orchestrator::OrchestratorHandle as Orchestrator;
pub use config::{EngineConfig, RuntimeKind};
pub use job::{JobRecord, JobStatus};
