use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::UserScope;

/// One async mutex per user scope, created on first use.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    inner: Mutex<HashMap<UserScope, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    /// Wait for exclusive write access to `scope`.
    pub async fn lock(&self, scope: &UserScope) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock();
            map.entry(scope.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
