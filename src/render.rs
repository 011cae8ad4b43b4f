pub mod backend;

/// Engine implementations behind [`backend::MapBackend`].
pub mod backends {
    /// In-memory reference engine
    pub mod memory;
    /// Native engine through its C shim
    #[cfg(feature = "backend_native")]
    pub mod native;
    pub mod null;
}

mod options;
pub use options::*;

pub mod viewport;

pub use viewport::BoundingBox;
