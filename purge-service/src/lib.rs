pub mod archive;
pub mod engine;
pub mod source;

#[cfg(test)]
mod tests;

pub use engine::{PurgeEngine, PurgeReport};
pub use source::{ArchiveSource, PostSource, RemoteSource, SourceBatch};
