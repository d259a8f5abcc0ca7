//! Input nodes
//!
//! Triggers that start a run and bring external data into it.

mod manual_trigger;
mod webhook_trigger;

pub use manual_trigger::ManualTrigger;
pub use webhook_trigger::WebhookTrigger;
