//! libSQL-backed implementations of the realtime store traits, plus the
//! notification pipeline that persists before fanning out.

mod messages;
mod notifications;
mod users;

pub use messages::MessageRepository;
pub use notifications::{NotificationRepository, NotificationService};
pub use users::UserRepository;
