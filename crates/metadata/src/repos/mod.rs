//! Repository traits for metadata operations.

pub mod gc;
pub mod generations;
pub mod nars;
pub mod refs;
pub mod roots;

pub use gc::GcRepo;
pub use generations::GenerationRepo;
pub use nars::NarRepo;
pub use refs::ReferenceRepo;
pub use roots::RootRepo;
