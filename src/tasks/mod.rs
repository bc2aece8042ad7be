pub mod synchronizer;
pub mod transport;

pub use synchronizer::{
    ConnectionInfo, ConnectionState, PollPolicy, ReconnectPolicy, StatusObserver,
    SubscriptionHandle, TaskStatusSynchronizer,
};
pub use transport::{ProgressConnection, ProgressTransport, TransportEvent, WebSocketTransport};
