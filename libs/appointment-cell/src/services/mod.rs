pub mod booking;
pub mod lifecycle;
pub mod notification;
pub mod queries;

pub use booking::AppointmentService;
pub use lifecycle::AppointmentLifecycleService;
pub use notification::{AppointmentNotice, NoticeKind, NotificationSender, TracingNotifier, WebhookNotifier};
pub use queries::AppointmentQueryService;
