use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;

use crate::{StoreError, StoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The set of references currently held by open writers of one store.
#[derive(Debug, Clone, Default)]
pub(crate) struct RefLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Keeps a reference locked until dropped.
#[derive(Debug)]
pub(crate) struct RefGuard {
    locks: RefLocks,
    reference: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RefLocks {
    /// Locks `reference` for the lifetime of the returned guard.
    pub(crate) fn acquire(&self, reference: &str) -> StoreResult<RefGuard> {
        if !self.held.lock().insert(reference.to_string()) {
            return Err(StoreError::Locked(reference.to_string()));
        }

        Ok(RefGuard {
            locks: self.clone(),
            reference: reference.to_string(),
        })
    }

    /// Checks if an open writer holds `reference`.
    pub(crate) fn is_held(&self, reference: &str) -> bool {
        self.held.lock().contains(reference)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for RefGuard {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.reference);
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflock_released_on_drop() -> anyhow::Result<()> {
        let locks = RefLocks::default();

        let guard = locks.acquire("layer-1")?;
        assert!(locks.is_held("layer-1"));
        assert!(matches!(
            locks.acquire("layer-1"),
            Err(StoreError::Locked(_))
        ));

        drop(guard);
        assert!(!locks.is_held("layer-1"));
        let _guard = locks.acquire("layer-1")?;

        Ok(())
    }
}
