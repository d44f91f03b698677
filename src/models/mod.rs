pub mod block;
pub mod context;
pub mod loaders;
pub mod result;
pub mod submission;

pub use block::{
    BlockConfig, GenerationConfig, ImageSource, OptionMapping, PipelineBlock, PipelineDefinition,
    PreprocessingConfig, QuestionMapping, ReferenceImageSpec, ScoringConfig, ScoringProfile,
};
pub use context::{ContextValue, ExecutionContext};
pub use loaders::{load_all_submissions, load_pipeline, load_submission};
pub use result::{
    BlockOutputs, BlockResult, ImageBuffer, PipelineFailure, PipelineResult, ReferenceSummary,
    ResolvedImage,
};
pub use submission::{Participant, RecordedAnswer, Submission, SubmissionStatus};
