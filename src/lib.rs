// Library entrypoint for the CLI and integration tests.
mod core;
pub mod orchestrator;
mod services;

pub use core::{config, schemas, shutdown};
pub use orchestrator::{
    AllowAll, Clock, HostState, PreferenceLookup, SortEngine, SortEngineBuilder, SortError,
    SortEvent, SortReport, SortSubscriber, Trigger, TriggerOutcome,
};
pub use services::llm;
