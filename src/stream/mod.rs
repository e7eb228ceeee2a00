//! Producer/consumer plumbing between pipeline workers and the transport.

pub mod channel;
pub mod coordinator;
pub mod event;

pub use channel::{ChannelState, EventReceiver, EventSender, channel};
pub use coordinator::{
    Pipeline, Reporter, StreamCoordinator, StreamHandle, StreamSession, StreamState,
};
pub use event::{Event, strip_nulls};
