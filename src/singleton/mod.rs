pub mod registry;
pub mod supervisor;

pub use registry::{Applied, SingletonHandle, SingletonRegistry};
pub use supervisor::SingletonSupervisor;
