//! Transactional resources.
//!
//! The transaction plugin reaches a database (or anything with the same
//! shape) only through [`TransactionalResource`]. The handler bound to a
//! router exposes its resource via [`Handler::resource`](crate::Handler::resource).

use std::any::Any;
use std::fmt;

/// A resource that hands out cursors and can commit or roll back.
pub trait TransactionalResource: Send + Sync {
    /// Opens a cursor for one call.
    fn cursor(&self) -> anyhow::Result<Cursor>;

    fn commit(&self) -> anyhow::Result<()>;

    fn rollback(&self) -> anyhow::Result<()>;
}

/// An opaque cursor, injected into a call's extensions.
///
/// Method bodies get the concrete type back with
/// [`Call::cursor`](crate::Call::cursor).
pub struct Cursor(Box<dyn Any + Send + Sync>);

impl Cursor {
    pub fn new<C: Send + Sync + 'static>(inner: C) -> Self {
        Self(Box::new(inner))
    }

    pub fn downcast_ref<C: 'static>(&self) -> Option<&C> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<C: 'static>(&mut self) -> Option<&mut C> {
        self.0.downcast_mut()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}
