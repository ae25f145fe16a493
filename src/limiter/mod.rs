pub mod counter_store;
pub mod service;
pub mod window;

pub use counter_store::{CounterStore, Verdict};
pub use service::{ActiveLimiter, LimiterHandle, LimiterService, LimiterSlot};
pub use window::WindowScheduler;
