//! sb-sms: HTTP client for the SMS gateway
//!
//! Pushes chat-originated messages to the gateway with basic auth and a
//! bounded, fixed-delay retry loop.

pub mod client;
pub mod error;

pub use client::{GatewayClient, OutboundMessage, RetryPolicy};
pub use error::{Result, SmsError};
