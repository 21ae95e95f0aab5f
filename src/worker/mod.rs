//! Summarization runs: the per-chat gate, the pipeline driver and CRM delivery.

pub mod coordinator;
pub mod deliver;
pub mod trigger;

// Re-export the main types for convenience
pub use coordinator::{
    CoordinatorSettings, Preview, RunOutcome, RunReport, RunRequest, SideEffect,
    TriggerCoordinator,
};
pub use deliver::{CrmDispatcher, CrmPayload, CrmSink, DispatchOutcome};
pub use trigger::{Acquire, TriggerGuard, TriggerState, TriggerTable};
