pub mod context_builder;
pub mod quiz_scoring;
pub mod reference_resolver;
pub mod retry;
pub mod variable_substitution;

pub use context_builder::build_context;
pub use quiz_scoring::{score_block, ScoringOutcome};
pub use reference_resolver::ReferenceImageResolver;
pub use retry::RetryPolicy;
pub use variable_substitution::{render_prompt, RenderedPrompt};
