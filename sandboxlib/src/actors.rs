pub mod orchestrator;
pub mod registry;
mod worker;
