//! Mirror lifecycle and garbage-collection engine.
//!
//! Drives the moving parts on top of the metadata store: closure
//! indexing against an upstream cache, the NAR download pipeline with
//! its concurrency limits, event-driven root status tracking, the
//! generation state machine, and mark-and-sweep garbage collection
//! over the global reference graph.

pub mod download;
pub mod error;
pub mod gc;
pub mod generations;
pub mod graph;
pub mod roots;
pub mod upstream;

pub use download::{DownloadReport, Downloader, MAX_CONCURRENT_FETCH};
pub use error::{EngineError, EngineResult};
pub use gc::{GarbageCollector, GcStats};
pub use generations::{GenerationManager, IndexOutcome};
pub use graph::ReferenceGraph;
pub use roots::RootManager;
pub use upstream::{NarFetcher, PathIndexer};
