pub mod billing_period;
pub mod entities;
pub mod gateway_event;
pub mod money;
