pub mod group;
pub mod message;
pub mod outcome;
pub mod preference;
pub mod recipient;
pub mod schedule;

pub use group::NotificationGroup;
pub use message::{ActionButton, Message, RenderMode};
pub use outcome::BroadcastOutcome;
pub use preference::RecipientPreference;
pub use recipient::RecipientId;
pub use schedule::{BroadcastKind, ScheduledBroadcast};
