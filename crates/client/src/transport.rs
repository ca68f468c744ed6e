use advance_core::protocol::{
    HeartbeatRequest, HeartbeatResponse, PollRequest, PollResponse, SaveRequest, SaveResponse,
};

use crate::TransportError;

/// The three sync endpoints as seen from a browser tab. The caller's
/// identity is carried by the transport (the session cookie), not by the
/// request bodies.
///
/// Calls are blocking and issued one at a time by their owner, which is
/// what keeps polls from one client strictly sequential.
pub trait SyncTransport {
    fn poll_delta(&mut self, request: &PollRequest) -> Result<PollResponse, TransportError>;

    fn heartbeat(&mut self, request: &HeartbeatRequest)
    -> Result<HeartbeatResponse, TransportError>;

    /// `Ok` with `success: false` is a server-reported failure; `Err` means
    /// the request never completed.
    fn save_fields(&mut self, request: &SaveRequest) -> Result<SaveResponse, TransportError>;
}
