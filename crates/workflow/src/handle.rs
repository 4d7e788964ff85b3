//! Middleware target-port handles.
//!
//! An edge that feeds a middleware instead of its host uses a target port of
//! the form `mw:<middleware_id>:input:<key>`.

use meridian_core::{NodeKey, PortKey};

/// A parsed middleware target-port handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareHandle {
    /// The middleware the edge binds into.
    pub middleware: NodeKey,
    /// The middleware input-port key.
    pub port: PortKey,
}

impl MiddlewareHandle {
    /// Prefix marking a middleware handle.
    pub const PREFIX: &'static str = "mw:";

    /// Parse `mw:<id>:input:<key>`. Returns `None` for ordinary port keys.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(Self::PREFIX)?;
        let (middleware, port) = rest.split_once(":input:")?;
        let middleware = NodeKey::new(middleware).ok()?;
        let port = PortKey::new(port).ok()?;
        Some(Self { middleware, port })
    }
}
