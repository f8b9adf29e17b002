/// Command and message handlers
pub mod handlers;
/// Status message rendering
pub mod progress_render;
/// Telegram API calls with retries
pub mod resilient;
/// Telegram delivery and status channels
pub mod transport;
/// Fixed user-facing texts
pub mod views;
