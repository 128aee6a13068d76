pub mod attachment_service;
pub mod conversation_service;
pub mod health_service;
pub mod notification_service;
pub mod realtime;
