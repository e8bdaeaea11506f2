pub mod engine;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use engine::{BookingWindow, SlotSchedule, Slots};
pub use models::*;
pub use services::*;
