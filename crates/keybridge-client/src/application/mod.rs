pub mod format_event;
pub mod key_target;
