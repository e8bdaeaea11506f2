pub mod booking;
pub mod lifecycle;
pub mod notification;
pub mod validation;

pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use notification::NotificationService;
