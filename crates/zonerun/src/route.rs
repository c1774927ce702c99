//! # Route Registry
//!
//! Maps dotted apiURLs to handlers. Built once at startup and read-only
//! afterwards.
//!
//! ## Philosophy
//!
//! - **Explicit Registry**: every path a zone serves is inserted by name. No
//!   reflection, no probing of namespace objects at dispatch time.
//! - **Opt-out Points**: a [`Route::SubRouter`] claims the rest of the path.
//!   The walk stops there and the sub-router sees the remaining segments.
//!
//! ## Invariants
//!
//! - A path never has both a route and children. Inserting one under the
//!   other is a `Conflict`.
//! - Resolution stops at the first route met, so a handler registered at
//!   `A.b` also receives `A.b.c` (the extra segments are ignored).

use std::collections::BTreeMap;
use std::sync::Arc;

use zonewire::Command;

/// A leaf handler. Receives the whole command as its only argument.
pub type Handler<C> = Arc<dyn Fn(&C, Command) + Send + Sync>;

/// A namespace that dispatches the rest of the path itself.
pub trait SubRouter<C>: Send + Sync + 'static {
    /// `remaining` holds the segments after the mount point; it may be empty.
    fn dispatch_command(&self, ctx: &C, remaining: &[&str], command: Command);
}

pub enum Route<C> {
    Leaf(Handler<C>),
    SubRouter(Arc<dyn SubRouter<C>>),
}

impl<C> Clone for Route<C> {
    fn clone(&self) -> Self {
        match self {
            Route::Leaf(h) => Route::Leaf(h.clone()),
            Route::SubRouter(s) => Route::SubRouter(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The path, a prefix of it, or a path below it is already taken.
    Conflict(String),
    EmptyPath,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict(path) => write!(f, "route conflict at {}", path),
            Self::EmptyPath => write!(f, "route path is empty"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of walking a path.
pub enum Resolution<'a, C> {
    Leaf(Handler<C>),
    SubRouter(Arc<dyn SubRouter<C>>, Vec<&'a str>),
    /// No route or namespace at this segment.
    Unresolved(&'a str),
    /// The path ended on a namespace.
    NotCallable,
}

enum Node<C> {
    Route(Route<C>),
    Namespace(BTreeMap<String, Node<C>>),
}

pub struct RouteTable<C> {
    root: BTreeMap<String, Node<C>>,
}

impl<C> Default for RouteTable<C> {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }
}

impl<C> RouteTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, route: Route<C>) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::EmptyPath);
        }
        let conflict = || Error::Conflict(path.to_string());

        let (last, parents) = segments.split_last().ok_or(Error::EmptyPath)?;
        let mut level = &mut self.root;
        for segment in parents {
            let node = level
                .entry(segment.to_string())
                .or_insert_with(|| Node::Namespace(BTreeMap::new()));
            level = match node {
                Node::Namespace(children) => children,
                Node::Route(_) => return Err(conflict()),
            };
        }
        if level.contains_key(*last) {
            return Err(conflict());
        }
        level.insert(last.to_string(), Node::Route(route));
        Ok(())
    }

    pub fn resolve<'a>(&self, path: &'a str) -> Resolution<'a, C> {
        let segments: Vec<&'a str> = path.split('.').collect();
        let mut level = &self.root;
        for (i, segment) in segments.iter().copied().enumerate() {
            match level.get(segment) {
                None => return Resolution::Unresolved(segment),
                Some(Node::Route(Route::Leaf(h))) => return Resolution::Leaf(h.clone()),
                Some(Node::Route(Route::SubRouter(s))) => {
                    return Resolution::SubRouter(s.clone(), segments[i + 1..].to_vec());
                }
                Some(Node::Namespace(children)) => level = children,
            }
        }
        Resolution::NotCallable
    }

    /// Every registered path, sorted.
    pub fn paths(&self) -> Vec<String> {
        fn walk<C>(prefix: &str, level: &BTreeMap<String, Node<C>>, out: &mut Vec<String>) {
            for (name, node) in level {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                match node {
                    Node::Route(_) => out.push(path),
                    Node::Namespace(children) => walk(&path, children, out),
                }
            }
        }
        let mut out = Vec::new();
        walk("", &self.root, &mut out);
        out
    }
}
