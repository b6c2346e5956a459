pub mod plan;
pub mod sum;

pub use plan::ValidatePlanCapability;
pub use sum::SumCapability;
