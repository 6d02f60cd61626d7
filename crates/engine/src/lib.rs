//! Notification core: template resolution, dispatch with static fallback,
//! deduplicated retryable delivery, and subscription access decisions.

pub mod dedup;
pub mod destination;
pub mod dispatcher;
pub mod executor;
pub mod fallback;
pub mod gate;
pub mod subscription;
pub mod templates;
pub mod transport;
