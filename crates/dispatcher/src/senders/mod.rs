//! Downstream sender implementations

mod log;

pub use self::log::LogSender;
