//! C ABI for linking nonet-core as a static library from Android (NDK) or other C/C++ hosts.
//! The host owns the radio: it supplies transport primitives and notification sinks as a
//! callback table, and forwards radio callbacks through the `nonet_core_on_*` functions.
//!
//! All calls on one handle must be serialized by the host (e.g. a single handler thread), and
//! callbacks must not call back into the same handle.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::exchange::{Direction, Message};
use crate::identity::{EndpointId, LocalIdentity};
use crate::lifecycle::ConnectionState;
use crate::notify::Notifier;
use crate::session::Session;
use crate::transport::{status, TransferProgress, Transport, TransportError, TransportEvent};

pub const NONET_OK: c_int = 0;
pub const NONET_ERR_INVALID_ARGUMENT: c_int = -1;
pub const NONET_ERR_UNKNOWN_ENDPOINT: c_int = -2;
pub const NONET_ERR_ALREADY_CONNECTED: c_int = -3;
pub const NONET_ERR_CONNECTION_IN_PROGRESS: c_int = -4;
pub const NONET_ERR_CONNECTION_FAILED: c_int = -5;
pub const NONET_ERR_CONNECTION_REJECTED: c_int = -6;
pub const NONET_ERR_NOT_CONNECTED: c_int = -7;
pub const NONET_ERR_EMPTY_MESSAGE: c_int = -8;
pub const NONET_ERR_TRANSPORT: c_int = -9;

/// Callback table supplied by the host. Transport primitives return 0 on success or a
/// transport status code. A missing (null) entry behaves as a failing primitive.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NonetHostCallbacks {
    pub ctx: *mut c_void,
    pub advertise: Option<
        extern "C" fn(ctx: *mut c_void, local_name: *const c_char, service_id: *const c_char) -> c_int,
    >,
    pub stop_advertising: Option<extern "C" fn(ctx: *mut c_void)>,
    pub discover: Option<extern "C" fn(ctx: *mut c_void, service_id: *const c_char) -> c_int>,
    pub stop_discovery: Option<extern "C" fn(ctx: *mut c_void)>,
    pub request_connection: Option<
        extern "C" fn(ctx: *mut c_void, local_name: *const c_char, endpoint_id: *const c_char) -> c_int,
    >,
    pub accept_connection:
        Option<extern "C" fn(ctx: *mut c_void, endpoint_id: *const c_char) -> c_int>,
    pub reject_connection:
        Option<extern "C" fn(ctx: *mut c_void, endpoint_id: *const c_char) -> c_int>,
    pub send_payload: Option<
        extern "C" fn(
            ctx: *mut c_void,
            endpoint_id: *const c_char,
            bytes: *const u8,
            len: usize,
        ) -> c_int,
    >,
    pub disconnect: Option<extern "C" fn(ctx: *mut c_void, endpoint_id: *const c_char)>,
    pub on_status: Option<extern "C" fn(ctx: *mut c_void, message: *const c_char)>,
    /// direction: 0 = sent, 1 = received.
    pub on_transcript_append: Option<
        extern "C" fn(
            ctx: *mut c_void,
            seq: u64,
            direction: c_int,
            sender: *const c_char,
            text: *const c_char,
        ),
    >,
    /// state: 0 idle, 1 requesting, 2 pending accept, 3 resolving, 4 connected.
    /// endpoint_id is null when idle.
    pub on_connection_state_changed:
        Option<extern "C" fn(ctx: *mut c_void, state: c_int, endpoint_id: *const c_char)>,
}

fn c_string(s: &str) -> Result<CString, TransportError> {
    CString::new(s).map_err(|_| TransportError::new(status::ERROR, "string contains NUL"))
}

fn host_result(code: c_int, what: &str) -> Result<(), TransportError> {
    if code == status::SUCCESS {
        Ok(())
    } else {
        Err(TransportError::new(code, format!("{} failed", what)))
    }
}

fn unsupported(what: &str) -> TransportError {
    TransportError::new(status::ERROR, format!("{} not supported by host", what))
}

/// Transport backed by host callbacks.
pub struct HostTransport(NonetHostCallbacks);

impl Transport for HostTransport {
    fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<(), TransportError> {
        let f = self.0.advertise.ok_or_else(|| unsupported("advertise"))?;
        let (name, service) = (c_string(local_name)?, c_string(service_id)?);
        host_result(f(self.0.ctx, name.as_ptr(), service.as_ptr()), "advertise")
    }

    fn stop_advertising(&mut self) {
        if let Some(f) = self.0.stop_advertising {
            f(self.0.ctx);
        }
    }

    fn discover(&mut self, service_id: &str) -> Result<(), TransportError> {
        let f = self.0.discover.ok_or_else(|| unsupported("discover"))?;
        let service = c_string(service_id)?;
        host_result(f(self.0.ctx, service.as_ptr()), "discover")
    }

    fn stop_discovery(&mut self) {
        if let Some(f) = self.0.stop_discovery {
            f(self.0.ctx);
        }
    }

    fn request_connection(
        &mut self,
        local_name: &str,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        let f = self
            .0
            .request_connection
            .ok_or_else(|| unsupported("request connection"))?;
        let (name, id) = (c_string(local_name)?, c_string(endpoint.as_str())?);
        host_result(f(self.0.ctx, name.as_ptr(), id.as_ptr()), "request connection")
    }

    fn accept_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError> {
        let f = self.0.accept_connection.ok_or_else(|| unsupported("accept"))?;
        let id = c_string(endpoint.as_str())?;
        host_result(f(self.0.ctx, id.as_ptr()), "accept")
    }

    fn reject_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError> {
        let f = self.0.reject_connection.ok_or_else(|| unsupported("reject"))?;
        let id = c_string(endpoint.as_str())?;
        host_result(f(self.0.ctx, id.as_ptr()), "reject")
    }

    fn send_payload(
        &mut self,
        endpoint: &EndpointId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let f = self.0.send_payload.ok_or_else(|| unsupported("send"))?;
        let id = c_string(endpoint.as_str())?;
        host_result(f(self.0.ctx, id.as_ptr(), bytes.as_ptr(), bytes.len()), "send")
    }

    fn disconnect(&mut self, endpoint: &EndpointId) {
        if let (Some(f), Ok(id)) = (self.0.disconnect, c_string(endpoint.as_str())) {
            f(self.0.ctx, id.as_ptr());
        }
    }
}

/// Notifier backed by host callbacks. Strings with interior NULs are dropped.
pub struct HostNotifier(NonetHostCallbacks);

impl Notifier for HostNotifier {
    fn on_status(&mut self, message: &str) {
        if let (Some(f), Ok(m)) = (self.0.on_status, CString::new(message)) {
            f(self.0.ctx, m.as_ptr());
        }
    }

    fn on_transcript_append(&mut self, message: &Message) {
        let Some(f) = self.0.on_transcript_append else {
            return;
        };
        let (Ok(sender), Ok(text)) = (
            CString::new(message.sender.as_str()),
            CString::new(message.text.as_str()),
        ) else {
            return;
        };
        let direction = match message.direction {
            Direction::Sent => 0,
            Direction::Received => 1,
        };
        f(self.0.ctx, message.seq, direction, sender.as_ptr(), text.as_ptr());
    }

    fn on_connection_state_changed(&mut self, state: &ConnectionState) {
        let Some(f) = self.0.on_connection_state_changed else {
            return;
        };
        let code = state_code(state);
        match state.endpoint().map(|e| CString::new(e.as_str())) {
            Some(Ok(id)) => f(self.0.ctx, code, id.as_ptr()),
            Some(Err(_)) => {}
            None => f(self.0.ctx, code, std::ptr::null()),
        }
    }
}

pub type HostSession = Session<HostTransport, HostNotifier>;

fn state_code(state: &ConnectionState) -> c_int {
    match state {
        ConnectionState::Idle => 0,
        ConnectionState::Requesting(_) => 1,
        ConnectionState::PendingAccept(_) => 2,
        ConnectionState::Resolving(_) => 3,
        ConnectionState::Connected(_) => 4,
    }
}

fn error_code(e: &SessionError) -> c_int {
    match e {
        SessionError::UnknownEndpoint(_) => NONET_ERR_UNKNOWN_ENDPOINT,
        SessionError::AlreadyConnected => NONET_ERR_ALREADY_CONNECTED,
        SessionError::ConnectionInProgress => NONET_ERR_CONNECTION_IN_PROGRESS,
        SessionError::ConnectionFailed(_) => NONET_ERR_CONNECTION_FAILED,
        SessionError::ConnectionRejected => NONET_ERR_CONNECTION_REJECTED,
        SessionError::NotConnected => NONET_ERR_NOT_CONNECTED,
        SessionError::EmptyMessage => NONET_ERR_EMPTY_MESSAGE,
        SessionError::TransportFailure(_) => NONET_ERR_TRANSPORT,
    }
}

fn to_code(r: Result<(), SessionError>) -> c_int {
    match r {
        Ok(()) => NONET_OK,
        Err(e) => error_code(&e),
    }
}

/// Borrow a C string as UTF-8. None if null or not UTF-8.
unsafe fn str_arg<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

unsafe fn session<'a>(h: *mut c_void) -> Option<&'a mut HostSession> {
    (h as *mut HostSession).as_mut()
}

/// Create a session. `display_name` and `service_id` may be null (random `UserNNNN` name,
/// default service id). Returns an opaque handle or null on failure.
#[no_mangle]
pub extern "C" fn nonet_core_create(
    callbacks: *const NonetHostCallbacks,
    display_name: *const c_char,
    service_id: *const c_char,
) -> *mut c_void {
    if callbacks.is_null() {
        return std::ptr::null_mut();
    }
    let callbacks = unsafe { *callbacks };
    let identity = match unsafe { str_arg(display_name) } {
        Some(name) if !name.trim().is_empty() => LocalIdentity::new(name),
        _ => LocalIdentity::generate(),
    };
    let mut config = SessionConfig::default();
    if let Some(service) = unsafe { str_arg(service_id) } {
        config.service_id = service.to_owned();
    }
    let session: HostSession = Session::new(
        identity,
        config,
        HostTransport(callbacks),
        HostNotifier(callbacks),
    );
    Box::into_raw(Box::new(session)) as *mut c_void
}

/// Destroy a session. No-op if h is null.
#[no_mangle]
pub extern "C" fn nonet_core_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut HostSession) };
}

/// Copy the local display name (NUL-terminated) into out_buf. Returns bytes written excluding
/// the NUL, or -1 if h is null or out_buf too small.
#[no_mangle]
pub extern "C" fn nonet_core_local_name(h: *mut c_void, out_buf: *mut c_char, out_len: usize) -> c_int {
    let Some(s) = (unsafe { session(h) }) else {
        return NONET_ERR_INVALID_ARGUMENT;
    };
    let name = s.local_name().as_bytes();
    if out_buf.is_null() || out_len < name.len() + 1 {
        return NONET_ERR_INVALID_ARGUMENT;
    }
    unsafe {
        let out = slice::from_raw_parts_mut(out_buf as *mut u8, out_len);
        out[..name.len()].copy_from_slice(name);
        out[name.len()] = 0;
    }
    name.len() as c_int
}

#[no_mangle]
pub extern "C" fn nonet_core_start_advertising(h: *mut c_void) -> c_int {
    match unsafe { session(h) } {
        Some(s) => to_code(s.start_advertising()),
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_stop_advertising(h: *mut c_void) -> c_int {
    match unsafe { session(h) } {
        Some(s) => {
            s.stop_advertising();
            NONET_OK
        }
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_start_discovery(h: *mut c_void) -> c_int {
    match unsafe { session(h) } {
        Some(s) => to_code(s.start_discovery()),
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_stop_discovery(h: *mut c_void) -> c_int {
    match unsafe { session(h) } {
        Some(s) => {
            s.stop_discovery();
            NONET_OK
        }
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_connect(h: *mut c_void, endpoint_id: *const c_char) -> c_int {
    match unsafe { (session(h), str_arg(endpoint_id)) } {
        (Some(s), Some(id)) => to_code(s.connect(&EndpointId::from(id))),
        _ => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_disconnect(h: *mut c_void) -> c_int {
    match unsafe { session(h) } {
        Some(s) => {
            s.disconnect();
            NONET_OK
        }
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

/// Send UTF-8 text to the connected peer.
#[no_mangle]
pub extern "C" fn nonet_core_send(h: *mut c_void, text: *const c_char) -> c_int {
    match unsafe { (session(h), str_arg(text)) } {
        (Some(s), Some(text)) => to_code(s.send(text).map(|_| ())),
        _ => NONET_ERR_INVALID_ARGUMENT,
    }
}

fn forward(h: *mut c_void, event: impl FnOnce() -> Option<TransportEvent>) -> c_int {
    let Some(s) = (unsafe { session(h) }) else {
        return NONET_ERR_INVALID_ARGUMENT;
    };
    match event() {
        Some(ev) => {
            s.handle_event(ev);
            NONET_OK
        }
        None => NONET_ERR_INVALID_ARGUMENT,
    }
}

#[no_mangle]
pub extern "C" fn nonet_core_on_endpoint_found(
    h: *mut c_void,
    endpoint_id: *const c_char,
    name: *const c_char,
) -> c_int {
    forward(h, || {
        let (id, name) = unsafe { (str_arg(endpoint_id)?, str_arg(name)?) };
        Some(TransportEvent::EndpointFound {
            endpoint: id.into(),
            name: name.to_owned(),
        })
    })
}

#[no_mangle]
pub extern "C" fn nonet_core_on_endpoint_lost(h: *mut c_void, endpoint_id: *const c_char) -> c_int {
    forward(h, || {
        let id = unsafe { str_arg(endpoint_id)? };
        Some(TransportEvent::EndpointLost { endpoint: id.into() })
    })
}

#[no_mangle]
pub extern "C" fn nonet_core_on_connection_initiated(
    h: *mut c_void,
    endpoint_id: *const c_char,
    peer_name: *const c_char,
) -> c_int {
    forward(h, || {
        let (id, name) = unsafe { (str_arg(endpoint_id)?, str_arg(peer_name)?) };
        Some(TransportEvent::ConnectionInitiated {
            endpoint: id.into(),
            peer_name: name.to_owned(),
        })
    })
}

/// success: non-zero for a successful resolution. code: transport status code.
#[no_mangle]
pub extern "C" fn nonet_core_on_connection_resolved(
    h: *mut c_void,
    endpoint_id: *const c_char,
    success: c_int,
    code: c_int,
) -> c_int {
    forward(h, || {
        let id = unsafe { str_arg(endpoint_id)? };
        Some(TransportEvent::ConnectionResolved {
            endpoint: id.into(),
            success: success != 0,
            code,
        })
    })
}

#[no_mangle]
pub extern "C" fn nonet_core_on_disconnected(h: *mut c_void, endpoint_id: *const c_char) -> c_int {
    forward(h, || {
        let id = unsafe { str_arg(endpoint_id)? };
        Some(TransportEvent::Disconnected { endpoint: id.into() })
    })
}

/// Raw payload bytes; they need not be valid UTF-8.
#[no_mangle]
pub extern "C" fn nonet_core_on_payload_received(
    h: *mut c_void,
    endpoint_id: *const c_char,
    bytes: *const u8,
    len: usize,
) -> c_int {
    forward(h, || {
        let id = unsafe { str_arg(endpoint_id)? };
        let bytes = if len == 0 {
            Vec::new()
        } else if bytes.is_null() {
            return None;
        } else {
            unsafe { slice::from_raw_parts(bytes, len) }.to_vec()
        };
        Some(TransportEvent::PayloadReceived {
            endpoint: id.into(),
            bytes,
        })
    })
}

#[no_mangle]
pub extern "C" fn nonet_core_on_payload_transfer_update(
    h: *mut c_void,
    endpoint_id: *const c_char,
    bytes_transferred: u64,
    total_bytes: u64,
) -> c_int {
    forward(h, || {
        let id = unsafe { str_arg(endpoint_id)? };
        Some(TransportEvent::PayloadTransferUpdate {
            endpoint: id.into(),
            progress: TransferProgress {
                bytes_transferred,
                total_bytes,
            },
        })
    })
}
