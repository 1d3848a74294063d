/// Command and message handlers for the update pipeline
pub mod handlers;
/// Outbound reply delivery and fallback messages
pub mod outbound;
