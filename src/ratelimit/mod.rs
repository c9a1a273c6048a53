//! Rate limiting: the admission gate and its time windows.

mod gate;
mod window;

pub use gate::{GateSnapshot, RateGate};
pub use window::TimeWindow;
