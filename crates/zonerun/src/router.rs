//! # Zone Router
//!
//! Owns the only call to the transport, and dispatches every inbound command
//! either to the callback it answers or to the handler its path names.
//!
//! ## Philosophy
//!
//! - **One Door**: nothing else in the crate touches the transport.
//! - **Never Throw Across the Boundary**: an inbound message that cannot be
//!   decoded, resolved or answered is logged and dropped. Outbound failures
//!   are returned to the local caller.
//!
//! ## Dispatch
//!
//! ```text
//! receive(wire)
//!   -> decode                    (malformed: log, drop)
//!   -> zone == ours && callbackId && !apiURL
//!        -> fire callback        (fast path for responses)
//!   -> resolve apiURL
//!        -> Leaf(handler)        handler(ctx, command)
//!        -> SubRouter(rest)      sub.dispatch_command(ctx, rest, command)
//!        -> otherwise            log, drop
//! ```

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use zonewire::CallbackHandle;
use zonewire::Command;
use zonewire::Zone;

use crate::callback;
use crate::callback::Callback;
use crate::callback::CallbackStore;
use crate::callback::HandleState;
use crate::callback::Reply;
use crate::config::Config;
use crate::config::UnknownHandles;
use crate::route::Resolution;
use crate::route::RouteTable;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug)]
pub enum Error {
    Transport(transport::Error),
    Wire(zonewire::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<zonewire::Error> for Error {
    fn from(e: zonewire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Routes commands for one zone. `C` is the context handed to handlers.
pub struct Router<C> {
    zone: Zone,
    transport: Arc<dyn Transport>,
    callbacks: CallbackStore,
    routes: RouteTable<C>,
    verbose: AtomicBool,
    unknown_handles: UnknownHandles,
}

impl<C: 'static> Router<C> {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, routes: RouteTable<C>) -> Self {
        Self {
            zone: config.zone,
            transport,
            callbacks: CallbackStore::new(config.zone),
            routes,
            verbose: AtomicBool::new(config.verbose_logging),
            unknown_handles: config.unknown_handles,
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn callbacks(&self) -> &CallbackStore {
        &self.callbacks
    }

    pub fn routes(&self) -> &RouteTable<C> {
        &self.routes
    }

    pub fn set_verbose_logging(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn verbose_logging(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    fn log_envelope(&self, direction: &'static str, command: &Command) {
        let api_url = command.api_url.as_deref().unwrap_or("-");
        if self.verbose_logging() {
            info!(zone = %self.zone, direction, api_url, callback_id = ?command.callback_id, "envelope");
        } else {
            trace!(zone = %self.zone, direction, api_url, callback_id = ?command.callback_id, "envelope");
        }
    }

    /// Sends `command` to the other zone. A callback, if given, is registered
    /// as a single-use handle and travels as `callbackId`/`zone`. If the send
    /// fails the handle is released again.
    pub fn send_command_to_remote(&self, mut command: Command, callback: Option<Callback>) -> Result<()> {
        let handle = callback.map(|cb| self.callbacks.to_handle(cb));
        if let Some(handle) = handle {
            command.set_callback_handle(handle);
        }

        let sent = self.transmit(&command);
        if let Err(e) = &sent {
            warn!(zone = %self.zone, api_url = ?command.api_url, error = %e, "send failed");
            if let Some(handle) = handle {
                self.callbacks.release(handle);
            }
        }
        sent
    }

    fn transmit(&self, command: &Command) -> Result<()> {
        self.log_envelope("send", command);
        let wire = command.encode()?;
        self.transport.send(&wire)?;
        Ok(())
    }

    /// Dispatches `command` in this zone, synchronously.
    pub fn send_command_to_local_zone(&self, ctx: &C, mut command: Command, callback: Option<Callback>) {
        if let Some(cb) = callback {
            command.set_callback_handle(self.callbacks.to_handle(cb));
        }
        self.log_envelope("local", &command);
        self.dispatch(ctx, command);
    }

    /// Sends locally when `target` is this zone, through the transport
    /// otherwise.
    pub fn send_to_zone(
        &self,
        ctx: &C,
        target: Zone,
        command: Command,
        callback: Option<Callback>,
    ) -> Result<()> {
        if target == self.zone {
            self.send_command_to_local_zone(ctx, command, callback);
            Ok(())
        } else {
            self.send_command_to_remote(command, callback)
        }
    }

    /// Entry point for everything the transport delivers.
    pub fn receive(&self, ctx: &C, wire: &str) {
        let command = match Command::decode(wire) {
            Ok(command) => command,
            Err(e) => {
                warn!(zone = %self.zone, error = %e, "dropping malformed command");
                return;
            }
        };
        self.log_envelope("recv", &command);

        if command.api_url.is_none() {
            match command.callback_handle() {
                Some(handle) if handle.zone == self.zone => self.fire(handle, &command),
                Some(handle) => {
                    warn!(zone = %self.zone, handle = %handle, "dropping response for a foreign handle")
                }
                None => warn!(zone = %self.zone, "dropping command with neither apiURL nor callback"),
            }
            return;
        }
        self.dispatch(ctx, command);
    }

    fn fire(&self, handle: CallbackHandle, command: &Command) {
        let Some(callback) = self.callbacks.take(handle) else {
            match self.callbacks.state(handle) {
                HandleState::Consumed => debug!(handle = %handle, "response for consumed handle"),
                _ => warn!(handle = %handle, "response for unknown handle"),
            }
            return;
        };
        callback(Reply {
            error: command.error().cloned(),
            data: command.callback_data().clone(),
        });
    }

    /// Walks the command's apiURL and hands the command to what it names.
    pub fn dispatch(&self, ctx: &C, command: Command) {
        let Some(path) = command.api_url.clone() else {
            warn!(zone = %self.zone, "dropping command without apiURL");
            return;
        };

        match self.routes.resolve(&path) {
            Resolution::Leaf(handler) => handler(ctx, command),
            Resolution::SubRouter(sub, remaining) => sub.dispatch_command(ctx, &remaining, command),
            Resolution::Unresolved(segment) => {
                warn!(zone = %self.zone, api_url = %path, segment, "unresolvable path, dropping command");
            }
            Resolution::NotCallable => {
                warn!(zone = %self.zone, api_url = %path, "path names a namespace, dropping command");
            }
        }
    }

    /// Turns a handle found in a payload into something callable.
    ///
    /// - live here: the original callable, consumed unless persistent
    /// - consumed here: a no-op
    /// - minted by the other zone: a forwarder that sends the reply back
    /// - never issued here: a no-op, or a forwarder under
    ///   `UnknownHandles::Forward`
    pub fn from_handle(&self, handle: CallbackHandle) -> Callback {
        match self.callbacks.state(handle) {
            HandleState::Live => match self.callbacks.take(handle) {
                Some(callback) => callback,
                None => callback::noop(),
            },
            HandleState::Consumed => {
                debug!(handle = %handle, "handle already consumed");
                callback::noop()
            }
            HandleState::Foreign => self.forwarder(handle),
            HandleState::Unknown => match self.unknown_handles {
                UnknownHandles::Forward => {
                    debug!(handle = %handle, "forwarding unknown handle");
                    self.forwarder(handle)
                }
                UnknownHandles::Reject => {
                    warn!(handle = %handle, "rejecting unknown handle");
                    callback::noop()
                }
            },
        }
    }

    fn forwarder(&self, handle: CallbackHandle) -> Callback {
        let transport = self.transport.clone();
        let zone = self.zone;
        callback::callback(move |reply: Reply| {
            let command = Command::response(handle, reply.error, reply.data);
            let sent = command
                .encode()
                .map_err(Error::from)
                .and_then(|wire| transport.send(&wire).map_err(Error::from));
            if let Err(e) = sent {
                warn!(zone = %zone, handle = %handle, error = %e, "forwarding failed");
            }
        })
    }

    /// Answers the callback carried by `command`, wherever it lives.
    pub fn respond(&self, command: &Command, reply: Reply) {
        match command.callback_handle() {
            Some(handle) => self.from_handle(handle)(reply),
            None => trace!(api_url = ?command.api_url, "no callback to answer"),
        }
    }
}
