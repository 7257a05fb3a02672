pub mod attendance;
pub mod core;
pub mod grades;
pub mod lifecycle;
pub mod schedules;
pub mod settings;
