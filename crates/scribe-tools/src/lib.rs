pub mod builtin;
pub mod invoke;
pub mod registry;

pub use invoke::{invoke, invoke_with_limit};
pub use registry::CapabilityRegistry;
