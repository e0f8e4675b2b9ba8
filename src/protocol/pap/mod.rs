//! Password Authentication Protocol state machines, as a timer consumer.
//!
//! This module holds the client ("authenticate with peer") and server
//! ("authenticate the peer") sides of PAP and nothing else: encoding and
//! decoding packets, and checking credentials, belong to the embedding
//! link. Outgoing traffic and verdicts go through [`PapLink`]; timeouts are
//! armed through any [`Scheduler`], keyed by [`PapTimer`] converted into the
//! stack's handler type, with the link identity `A` as argument.
//!
//! ```text
//! client: Initial --lower_up--> Closed --auth_with_peer--> AuthReq --ack--> Open
//!            |                                         |  ^
//!       auth_with_peer                            nak / retransmit limit
//!            v                                         v  |
//!         Pending --lower_up--> AuthReq             BadAuth
//! ```
use crate::error::TimerError;
use crate::protocol::traits::scheduler::Scheduler;

//==================================================================================Constants
/// Retransmit interval of an unanswered authenticate-request.
pub const PAP_DEFAULT_TIMEOUT_MS: u32 = 3_000;
/// How long the server waits for the peer to authenticate.
pub const PAP_DEFAULT_REQ_TIMEOUT_MS: u32 = 30_000;
/// Authenticate-requests sent before the client gives up.
pub const PAP_DEFAULT_MAX_TRANSMITS: u8 = 10;
/// Longest user name or password a request can carry.
pub const PAP_MAX_CREDENTIAL_LEN: usize = 255;

//==================================================================================Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientState {
    /// Lower layer down, nothing requested.
    Initial,
    /// Lower layer up, nothing requested.
    Closed,
    /// Authentication requested, waiting for the lower layer.
    Pending,
    /// Authenticate-request sent, waiting for the answer.
    AuthReq,
    Open,
    BadAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerState {
    Initial,
    Closed,
    Pending,
    /// Waiting for the peer's authenticate-request.
    Listen,
    Open,
    BadAuth,
}

/// Timeouts armed by PAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PapTimer {
    /// Resend the authenticate-request.
    Retransmit,
    /// Give up waiting for the peer.
    RequestTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PapConfig {
    pub timeout_ms: u32,
    pub max_transmits: u8,
    /// Zero disables the server-side request timeout.
    pub req_timeout_ms: u32,
}

impl PapConfig {
    pub const DEFAULT: Self = Self {
        timeout_ms: PAP_DEFAULT_TIMEOUT_MS,
        max_transmits: PAP_DEFAULT_MAX_TRANSMITS,
        req_timeout_ms: PAP_DEFAULT_REQ_TIMEOUT_MS,
    };
}

impl Default for PapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What PAP needs from the link it runs on.
pub trait PapLink {
    /// Emit an authenticate-request.
    fn send_auth_request(&mut self, id: u8, user: &[u8], password: &[u8]);
    /// Emit an authenticate-ack (`accepted`) or authenticate-nak.
    fn send_auth_response(&mut self, id: u8, accepted: bool);
    /// The peer accepted our credentials.
    fn with_peer_success(&mut self);
    /// The peer refused us, or never answered.
    fn with_peer_failure(&mut self);
    /// The peer proved its identity.
    fn peer_success(&mut self);
    /// The peer failed to authenticate, or never tried.
    fn peer_failure(&mut self);
}

#[derive(Clone, Copy)]
struct Credential {
    bytes: [u8; PAP_MAX_CREDENTIAL_LEN],
    len: u8,
}

impl Credential {
    const EMPTY: Self = Self {
        bytes: [0; PAP_MAX_CREDENTIAL_LEN],
        len: 0,
    };

    fn set(&mut self, value: &[u8]) {
        let len = value.len().min(PAP_MAX_CREDENTIAL_LEN);
        self.bytes[..len].copy_from_slice(&value[..len]);
        // len <= 255 by construction
        self.len = len as u8;
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

//==================================================================================State machine
/// PAP instance of one link, whose timeouts carry `arg`.
pub struct Upap<A> {
    arg: A,
    config: PapConfig,
    client: ClientState,
    server: ServerState,
    user: Credential,
    password: Credential,
    /// Identifier of the last request sent.
    id: u8,
    transmits: u8,
}

impl<A: Copy + PartialEq> Upap<A> {
    pub fn new(arg: A) -> Self {
        Self::with_config(arg, PapConfig::DEFAULT)
    }

    pub fn with_config(arg: A, config: PapConfig) -> Self {
        Self {
            arg,
            config,
            client: ClientState::Initial,
            server: ServerState::Initial,
            user: Credential::EMPTY,
            password: Credential::EMPTY,
            id: 0,
            transmits: 0,
        }
    }

    pub fn client_state(&self) -> ClientState {
        self.client
    }

    pub fn server_state(&self) -> ServerState {
        self.server
    }

    /// Authenticate-requests sent for the current attempt.
    pub fn transmits(&self) -> u8 {
        self.transmits
    }

    /// Identifier of the last authenticate-request.
    pub fn request_id(&self) -> u8 {
        self.id
    }

    //------------------------------------------------------------------Lower layer
    /// The link below came up: start whatever was requested meanwhile.
    pub fn lower_up<K, S, L>(&mut self, timers: &mut S, link: &mut L) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        match self.client {
            ClientState::Initial => self.client = ClientState::Closed,
            ClientState::Pending => self.send_request(timers, link)?,
            _ => {}
        }

        match self.server {
            ServerState::Initial => self.server = ServerState::Closed,
            ServerState::Pending => self.listen(timers)?,
            _ => {}
        }
        Ok(())
    }

    /// The link below went down: drop pending timeouts and start over.
    pub fn lower_down<K, S>(&mut self, timers: &mut S)
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
    {
        if self.client == ClientState::AuthReq {
            timers.cancel(PapTimer::Retransmit.into(), self.arg);
        }
        if self.server == ServerState::Listen && self.config.req_timeout_ms > 0 {
            timers.cancel(PapTimer::RequestTimeout.into(), self.arg);
        }
        self.client = ClientState::Initial;
        self.server = ServerState::Initial;
    }

    /// The peer rejected the protocol: fail whatever was in progress.
    pub fn protocol_reject<K, S, L>(&mut self, timers: &mut S, link: &mut L)
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        if self.client == ClientState::AuthReq {
            #[cfg(feature = "defmt")]
            defmt::error!("PAP authentication failed: protocol rejected by peer");
            link.with_peer_failure();
        }
        if self.server == ServerState::Listen {
            #[cfg(feature = "defmt")]
            defmt::error!("PAP authentication of peer failed: protocol rejected");
            link.peer_failure();
        }
        self.lower_down(timers);
    }

    //------------------------------------------------------------------Client side
    /// Authenticate with the peer using `user` / `password`.
    pub fn auth_with_peer<K, S, L>(
        &mut self,
        timers: &mut S,
        link: &mut L,
        user: &[u8],
        password: &[u8],
    ) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        self.user.set(user);
        self.password.set(password);
        self.transmits = 0;

        if matches!(self.client, ClientState::Initial | ClientState::Pending) {
            self.client = ClientState::Pending;
            return Ok(());
        }
        self.send_request(timers, link)
    }

    /// Authenticate-ack received for request `id`.
    pub fn on_auth_ack<K, S, L>(&mut self, timers: &mut S, link: &mut L, id: u8)
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        if !self.expects_answer(id) {
            return;
        }
        timers.cancel(PapTimer::Retransmit.into(), self.arg);
        self.client = ClientState::Open;

        #[cfg(feature = "defmt")]
        defmt::info!("PAP authentication succeeded");

        link.with_peer_success();
    }

    /// Authenticate-nak received for request `id`.
    pub fn on_auth_nak<K, S, L>(&mut self, timers: &mut S, link: &mut L, id: u8)
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        if !self.expects_answer(id) {
            return;
        }
        timers.cancel(PapTimer::Retransmit.into(), self.arg);
        self.client = ClientState::BadAuth;

        #[cfg(feature = "defmt")]
        defmt::error!("PAP authentication failed");

        link.with_peer_failure();
    }

    /// [`PapTimer::Retransmit`] fell due.
    pub fn on_retransmit_timeout<K, S, L>(
        &mut self,
        timers: &mut S,
        link: &mut L,
    ) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        if self.client != ClientState::AuthReq {
            return Ok(());
        }
        if self.transmits >= self.config.max_transmits {
            #[cfg(feature = "defmt")]
            defmt::error!("No response to {} PAP authenticate-requests", self.transmits);
            self.client = ClientState::BadAuth;
            link.with_peer_failure();
            return Ok(());
        }
        self.send_request(timers, link)
    }

    fn expects_answer(&self, id: u8) -> bool {
        if self.client != ClientState::AuthReq {
            return false;
        }
        if id != self.id {
            #[cfg(feature = "defmt")]
            defmt::warn!("PAP answer id {} does not match request {}", id, self.id);
            return false;
        }
        true
    }

    fn send_request<K, S, L>(&mut self, timers: &mut S, link: &mut L) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        self.id = self.id.wrapping_add(1);
        link.send_auth_request(self.id, self.user.as_slice(), self.password.as_slice());
        timers.cancel(PapTimer::Retransmit.into(), self.arg);
        timers.schedule_relative(self.config.timeout_ms, PapTimer::Retransmit.into(), self.arg)?;
        self.transmits += 1;
        self.client = ClientState::AuthReq;
        Ok(())
    }

    //------------------------------------------------------------------Server side
    /// Require the peer to authenticate.
    pub fn auth_peer<K, S>(&mut self, timers: &mut S) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
    {
        if matches!(self.server, ServerState::Initial | ServerState::Pending) {
            self.server = ServerState::Pending;
            return Ok(());
        }
        self.listen(timers)
    }

    /// The link decided on the peer's authenticate-request `id`.
    pub fn on_peer_verdict<K, S, L>(&mut self, timers: &mut S, link: &mut L, id: u8, accepted: bool)
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
        L: PapLink,
    {
        match self.server {
            ServerState::Initial | ServerState::Closed | ServerState::Pending => return,
            // Our answer got lost: repeat the earlier verdict.
            ServerState::Open => {
                link.send_auth_response(id, true);
                return;
            }
            ServerState::BadAuth => {
                link.send_auth_response(id, false);
                return;
            }
            ServerState::Listen => {}
        }

        link.send_auth_response(id, accepted);
        if self.config.req_timeout_ms > 0 {
            timers.cancel(PapTimer::RequestTimeout.into(), self.arg);
        }
        if accepted {
            self.server = ServerState::Open;
            link.peer_success();
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("PAP peer authentication failed");
            self.server = ServerState::BadAuth;
            link.peer_failure();
        }
    }

    /// [`PapTimer::RequestTimeout`] fell due.
    pub fn on_request_timeout<L: PapLink>(&mut self, link: &mut L) {
        if self.server != ServerState::Listen {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::info!("No PAP authenticate-request received from peer");
        self.server = ServerState::BadAuth;
        link.peer_failure();
    }

    fn listen<K, S>(&mut self, timers: &mut S) -> Result<(), TimerError>
    where
        K: From<PapTimer>,
        S: Scheduler<K, A> + ?Sized,
    {
        if self.config.req_timeout_ms > 0 {
            timers.cancel(PapTimer::RequestTimeout.into(), self.arg);
            timers.schedule_relative(
                self.config.req_timeout_ms,
                PapTimer::RequestTimeout.into(),
                self.arg,
            )?;
        }
        self.server = ServerState::Listen;
        Ok(())
    }
}
