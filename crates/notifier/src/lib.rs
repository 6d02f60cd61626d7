//! Delivery side of the notification core: concrete mail/SMS transports, the
//! Redis job queue and its worker, and the daily reminder fan-out.

pub mod queue;
pub mod reminders;
pub mod setup;
pub mod sms;
pub mod smtp;
pub mod supplier_sms;
pub mod worker;
