pub mod registry;
pub mod staging;

pub use registry::BufferRegistry;
pub use staging::StagingBuffer;
