/// Batch handler that stages albums and single photos
pub mod album;
/// Command and message handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// User state and dialogue management
pub mod state;
/// Telegram implementation of the media and delivery ports
pub mod transport;
/// View layer for UI components (keyboards, messages)
pub mod views;
