//! # Runtime
//!
//! Everything one zone owns: its router and callback store, its session of
//! distributed objects, the classes it serves and its batch.
//!
//! A runtime is assembled once through [`RuntimeBuilder`] and shared as
//! `Arc<Runtime>`. Its zone never changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use zonewire::Command;
use zonewire::Zone;

use crate::arg;
use crate::arg::Arg;
use crate::batch::Batch;
use crate::builder::RuntimeBuilder;
use crate::callback::Callback;
use crate::object;
use crate::object::Session;
use crate::router;
use crate::router::Router;
use crate::rpc::ClassObject;

pub struct Runtime {
    router: Router<Runtime>,
    session: Session,
    classes: HashMap<String, Arc<dyn ClassObject>>,
    batch: Batch,
}

impl Runtime {
    pub fn builder(zone: Zone) -> RuntimeBuilder {
        RuntimeBuilder::new(zone)
    }

    pub(crate) fn from_parts(
        router: Router<Runtime>,
        session: Session,
        classes: HashMap<String, Arc<dyn ClassObject>>,
    ) -> Self {
        Self {
            router,
            session,
            classes,
            batch: Batch::new(),
        }
    }

    pub fn zone(&self) -> Zone {
        self.router.zone()
    }

    pub fn router(&self) -> &Router<Runtime> {
        &self.router
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn class(&self, name: &str) -> Option<Arc<dyn ClassObject>> {
        self.classes.get(name).cloned()
    }

    /// Hands a wire string delivered by the transport to the router.
    pub fn receive(&self, wire: &str) {
        self.router.receive(self, wire);
    }

    pub fn send_command_to_remote(&self, command: Command, callback: Option<Callback>) -> router::Result<()> {
        self.router.send_command_to_remote(command, callback)
    }

    pub fn send_command_to_local_zone(&self, command: Command, callback: Option<Callback>) {
        self.router.send_command_to_local_zone(self, command, callback);
    }

    pub fn send_to_zone(&self, target: Zone, command: Command, callback: Option<Callback>) -> router::Result<()> {
        self.router.send_to_zone(self, target, command, callback)
    }

    /// Sends to the privileged zone, locally if this is it.
    pub fn send_to_privileged(&self, command: Command, callback: Option<Callback>) -> router::Result<()> {
        self.send_to_zone(Zone::Privileged, command, callback)
    }

    /// Sends to the public zone, locally if this is it.
    pub fn send_to_public(&self, command: Command, callback: Option<Callback>) -> router::Result<()> {
        self.send_to_zone(Zone::Public, command, callback)
    }

    pub fn set_verbose_logging(&self, verbose: bool) {
        self.router.set_verbose_logging(verbose);
    }

    pub fn marshal(&self, arg: &Arg) -> Value {
        arg::marshal(arg, self.router.callbacks())
    }

    pub fn unmarshal(&self, value: &Value) -> object::Result<Arg> {
        arg::unmarshal(self, value)
    }
}
