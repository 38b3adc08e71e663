pub mod notification;
pub mod task_registry;
pub mod watch;
