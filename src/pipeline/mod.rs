//! Per-rule event processing: filter checks, duplicate detection and
//! conflict resolution.

pub mod duplicates;
pub mod filter;
pub mod resolver;
pub mod similar;
pub mod trace;

pub use duplicates::{is_duplicate, Broadcast, SIMILARITY_THRESHOLD};
pub use filter::{Decision, EventFilterPipeline, FilterContext, Verdict};
pub use resolver::{describe_conflicts, ConflictResolver, RulePass};
pub use similar::{SimilarGroup, SimilarGroups};
pub use trace::EventTrace;
