//! Bus-facing handlers.

pub mod registry_sync;

pub use registry_sync::RegistrySyncHandler;
