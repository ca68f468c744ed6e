pub mod autosave;
pub mod client;
pub mod error;
pub mod heartbeat;
pub mod merge;
pub mod poller;
pub mod session;
pub mod transport;
pub mod view;


pub use autosave::{AutosaveScheduler, FlushOutcome, SaveStatus, UnloadDecision};
pub use client::{SyncClient, TickReport};
pub use error::TransportError;
pub use heartbeat::{HeartbeatOutcome, HeartbeatPoller};
pub use merge::{MergeEngine, MergeOutcome};
pub use poller::{PollOutcome, SyncPoller};
pub use session::SessionContext;
pub use transport::SyncTransport;
pub use view::{FieldView, MemoryView};
