pub mod api;
mod claude;
mod errors;
mod image;
mod opentelemetry;
mod runtime;
pub mod testing;

pub use claude::*;
pub use errors::*;
pub use image::{detect_media_type, load_image, load_image_base64, ImageSource, DEFAULT_MEDIA_TYPE};
pub use runtime::{BedrockRuntime, ChunkStream, InvokeModelRequest, ModelRuntime, JSON_CONTENT_TYPE};
