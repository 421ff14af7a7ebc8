//! Route handlers, one module per resource.

pub mod channels;
pub mod destinations;
pub mod events;
pub mod rules;
pub mod webhooks;
