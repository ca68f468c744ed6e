use std::sync::{Arc, Mutex, PoisonError};

use advance_client::{SyncTransport, TransportError};
use advance_core::{
    UserRef,
    protocol::{
        HeartbeatRequest, HeartbeatResponse, PollRequest, PollResponse, SaveRequest, SaveResponse,
        from_json, to_json,
    },
};
use advance_engine::{EngineError, SyncEngine};
use serde::{Serialize, de::DeserializeOwned};

/// In-process transport to a shared engine. Every request and response is
/// pushed through its JSON encoding, as it would be over HTTP.
pub struct LoopbackTransport {
    engine: Arc<Mutex<SyncEngine>>,
    user: UserRef,
    offline: bool,
    save_error: Option<String>,
}

impl LoopbackTransport {
    pub fn new(engine: Arc<Mutex<SyncEngine>>, user: UserRef) -> Self {
        Self {
            engine,
            user,
            offline: false,
            save_error: None,
        }
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Make the server reject saves with `message` until cleared.
    pub fn set_save_error(&mut self, message: Option<&str>) {
        self.save_error = message.map(str::to_string);
    }

    fn exchange<Req, Resp>(
        &self,
        request: &Req,
        handle: impl FnOnce(&mut SyncEngine, &UserRef, Req) -> Result<Resp, EngineError>,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + DeserializeOwned,
        Resp: Serialize + DeserializeOwned,
    {
        if self.offline {
            return Err(TransportError::Network("connection refused".into()));
        }
        let body = to_json(request)?;
        let decoded: Req = from_json(&body).map_err(|e| TransportError::Status {
            code: 400,
            message: e.to_string(),
        })?;

        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let response = handle(&mut *engine, &self.user, decoded).map_err(|e| {
            TransportError::Status {
                code: 500,
                message: e.to_string(),
            }
        })?;
        drop(engine);

        let body = to_json(&response)?;
        Ok(from_json(&body)?)
    }
}

impl SyncTransport for LoopbackTransport {
    fn poll_delta(&mut self, request: &PollRequest) -> Result<PollResponse, TransportError> {
        self.exchange(request, |engine, user, req| engine.poll_delta(user, &req))
    }

    fn heartbeat(
        &mut self,
        request: &HeartbeatRequest,
    ) -> Result<HeartbeatResponse, TransportError> {
        self.exchange(request, |engine, user, req| engine.heartbeat(user, &req))
    }

    fn save_fields(&mut self, request: &SaveRequest) -> Result<SaveResponse, TransportError> {
        let save_error = self.save_error.clone();
        self.exchange(request, move |engine, user, req| {
            Ok(match save_error {
                Some(message) => SaveResponse::failed(message),
                None => engine.save_fields_response(user, &req),
            })
        })
    }
}
