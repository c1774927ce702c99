//! # Runtime Builder
//!
//! Fluent API for assembling a runtime: its transport, the object types it
//! can construct, the classes it serves and the routes it answers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use zonewire::Command;
use zonewire::Zone;
use zonewire::api;

use crate::config::Config;
use crate::config::UnknownHandles;
use crate::object::Schema;
use crate::object::Session;
use crate::route;
use crate::route::Route;
use crate::route::RouteTable;
use crate::route::SubRouter;
use crate::router::Router;
use crate::rpc::ClassObject;
use crate::rpc::RpcRoutes;
use crate::runtime::Runtime;
use crate::transport::Disconnected;
use crate::transport::Transport;

/// Fluent builder for a [`Runtime`]. Route conflicts surface from `build`.
pub struct RuntimeBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    session: Session,
    classes: HashMap<String, Arc<dyn ClassObject>>,
    routes: Vec<(String, Route<Runtime>)>,
}

impl RuntimeBuilder {
    pub fn new(zone: Zone) -> Self {
        Self {
            config: Config::new(zone),
            transport: None,
            session: Session::new(),
            classes: HashMap::new(),
            routes: Vec::new(),
        }
    }

    /// Without a transport, every remote send fails with `ConnectionLost`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn verbose_logging(mut self, verbose: bool) -> Self {
        self.config.verbose_logging = verbose;
        self
    }

    pub fn unknown_handles(mut self, policy: UnknownHandles) -> Self {
        self.config.unknown_handles = policy;
        self
    }

    /// Lets the session build bare instances of `T` when a reference to an
    /// unseen `T` arrives.
    pub fn register_type<T: Schema>(mut self) -> Self {
        self.session.register_type::<T>();
        self
    }

    pub fn register_class(mut self, name: impl Into<String>, class: impl ClassObject) -> Self {
        self.classes.insert(name.into(), Arc::new(class));
        self
    }

    pub fn route<F>(mut self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Runtime, Command) + Send + Sync + 'static,
    {
        self.routes.push((path.into(), Route::Leaf(Arc::new(handler))));
        self
    }

    pub fn mount(mut self, path: impl Into<String>, sub: impl SubRouter<Runtime>) -> Self {
        self.routes.push((path.into(), Route::SubRouter(Arc::new(sub))));
        self
    }

    pub fn build(self) -> route::Result<Arc<Runtime>> {
        let mut table = RouteTable::new();
        table.insert(api::NAMESPACE, Route::SubRouter(Arc::new(RpcRoutes)))?;
        for (path, route) in self.routes {
            table.insert(&path, route)?;
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(Disconnected) as Arc<dyn Transport>);
        debug!(zone = %self.config.zone, routes = ?table.paths(), "runtime built");

        let router = Router::new(&self.config, transport, table);
        Ok(Arc::new(Runtime::from_parts(router, self.session, self.classes)))
    }
}
