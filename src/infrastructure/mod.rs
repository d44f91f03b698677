pub mod asset_store;
pub mod submission_store;

pub use asset_store::{AssetStore, LocalAssetStore};
pub use submission_store::{InMemorySubmissionStore, SubmissionStore};
