pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::estimation;
pub use services::patients::PatientService;
pub use services::pending::SettingsService;
pub use services::queue::QueueService;
