pub mod bus;
pub mod interval;
pub mod trigger;

pub use bus::EventBus;
pub use interval::spawn_interval_trigger;
pub use trigger::{Trigger, TriggerEvent};
