pub mod conversation;
pub mod message;
pub mod notification;
pub mod summary;

pub use conversation::ConversationRecord;
pub use message::MessageRecord;
pub use notification::NotificationRecord;
pub use summary::{ProductSummaryRecord, UserSummaryRecord};
