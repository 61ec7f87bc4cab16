mod backend;
mod backends;
pub mod postprocess;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{build_registry, BackendRegistry, SharedBackend};
pub use result::{BoundingBox, Detection, DetectionSet};
