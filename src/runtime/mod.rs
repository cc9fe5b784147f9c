mod channel;

pub use channel::{Channel, ChannelEvent, ChannelOptions, GraphEventHandle, ReplayStatusHandle, StepEventHandle, SubscriptionId};
