/// Drives the handshake and reconnection lifecycle (`spec.md` §4.4):
///
/// ```text
///  Init -> Connecting -> Authenticating -> Registering -> Active
///                            ^                               |
///                            `------------ Reconnecting <-----'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Connecting,
    Authenticating,
    Registering,
    Active,
    Reconnecting,
}

/// Session identity that must survive a reconnect: the broker-issued `cid`
/// and the phase driving the handshake state machine.
///
/// The broker-issued `cid` is reused verbatim across a reconnect so the
/// broker can recognize returning workers/clients; the auth token is reused
/// too unless the broker explicitly invalidated it (`spec.md` §4.4).
#[derive(Debug, Clone)]
pub struct Session {
    phase: SessionPhase,
    cid: Option<String>,
    token_valid: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Init,
            cid: None,
            token_valid: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn cid(&self) -> Option<&str> {
        self.cid.as_deref()
    }

    pub fn enter_connecting(&mut self) {
        self.phase = SessionPhase::Connecting;
    }

    pub fn enter_authenticating(&mut self) {
        self.phase = SessionPhase::Authenticating;
    }

    pub fn token_issued(&mut self) {
        self.token_valid = true;
    }

    /// The broker explicitly rejected the current token; the next handshake
    /// attempt must build a fresh one instead of replaying it.
    pub fn invalidate_token(&mut self) {
        self.token_valid = false;
    }

    pub fn token_reusable(&self) -> bool {
        self.token_valid
    }

    pub fn enter_registering(&mut self) {
        self.phase = SessionPhase::Registering;
    }

    /// Stores the broker-issued `cid` and transitions to Active.
    pub fn activate(&mut self, cid: impl Into<String>) {
        self.cid = Some(cid.into());
        self.phase = SessionPhase::Active;
    }

    /// Connection loss from Active: preserves `cid` and token validity,
    /// moves to Reconnecting (`spec.md` §4.4).
    pub fn enter_reconnecting(&mut self) {
        self.phase = SessionPhase::Reconnecting;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
