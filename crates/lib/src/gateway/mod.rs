//! Gateway: HTTP surface for the relay.
//!
//! Single port. `POST /inbound` receives email webhooks; `/messages` lists what was stored;
//! `/reply` and `/compose` queue outbound mail to allow-listed recipients.

mod protocol;
mod server;

pub use protocol::{
    ComposeBody, ErrorBody, InboundAck, InboundBody, ListQuery, QueuedAck, ReplyBody,
    WARNING_AI_UNAVAILABLE,
};
pub use server::{router, run_gateway, serve, GatewayState};
