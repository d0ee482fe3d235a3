pub mod orchestrator;
pub mod provider;
pub mod quality_gate;
pub mod retry_policy;
pub mod scheduler;
pub mod scorer;
pub mod thresholds;
