//! Batch transform pipeline.
//!
//! - **job**: transform jobs and operations
//! - **codec**: decode/transform/encode seam and its `image` implementation
//! - **validate**: checks run before decoding
//! - **processor**: bounded concurrent execution of a batch
//! - **discovery**: find uploads on disk

pub mod codec;
pub mod discovery;
pub mod job;
pub mod processor;
pub mod validate;

pub use codec::{DecodedImage, DynamicImageCodec, ImageCodec};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use job::{Operation, TransformJob};
pub use processor::{BatchProcessor, CancelFlag};
pub use validate::Validator;
