//! Billing notification adapters.

mod logging_notifier;
mod recording_notifier;

pub use logging_notifier::LoggingNotifier;
pub use recording_notifier::RecordingNotifier;
