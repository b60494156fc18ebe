//! Shared handle to a tracked entity instance.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, interior-mutable entity.
///
/// The caller, the unit of work and the command that persists the entity all
/// hold clones of the same handle, so a key assigned by the database on
/// insert is visible to the caller after the save.
pub struct EntityRef<E>(Arc<Mutex<E>>);

impl<E> EntityRef<E> {
    pub fn new(entity: E) -> Self {
        Self(Arc::new(Mutex::new(entity)))
    }

    /// Lock for reading. Never hold the guard across an `.await`.
    pub fn read(&self) -> MutexGuard<'_, E> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for writing. Never hold the guard across an `.await`.
    pub fn write(&self) -> MutexGuard<'_, E> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<E: Clone> EntityRef<E> {
    /// Snapshot of the current state
    pub fn cloned(&self) -> E {
        self.read().clone()
    }
}

impl<E> Clone for EntityRef<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E> From<E> for EntityRef<E> {
    fn from(entity: E) -> Self {
        Self::new(entity)
    }
}

impl<E: fmt::Debug> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&*self.read()).finish()
    }
}
