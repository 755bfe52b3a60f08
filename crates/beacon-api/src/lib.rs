// beacon-api: push channel and pull-query clients for the incident dispatch server

pub mod client;
pub mod error;
pub mod push;

pub use client::{IncidentClient, IncidentPage, IncidentQuery};
pub use error::Error;
pub use push::{
    BroadcastAck, BroadcastRequest, ChannelState, PushChannel, PushEvent, ReconnectConfig,
    SubscriptionId,
};
