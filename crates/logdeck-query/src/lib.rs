//! LogDeck Query - Paginated queries and live subscriptions over log sources

mod engine;
mod merge;
mod registry;
mod subscribe;

pub use engine::{EngineConfig, LogQueryEngine};
pub use merge::{merge_runs, Merged};
pub use registry::{SourceDef, SourceRegistry};
pub use subscribe::{StreamEvent, Subscription};
