pub mod image_client;
pub mod registry;

pub use image_client::{EditRequest, GenerateRequest, ImageProvider, OpenAiImageClient};
pub use registry::ProviderRegistry;
