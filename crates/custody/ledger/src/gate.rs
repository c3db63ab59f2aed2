use crate::{LedgerError, LedgerResult};
use tokio::sync::{RwLock, RwLockReadGuard};

/// Shutdown barrier shared by ledger backends.
///
/// Operations hold a read guard for their whole duration. `close` takes the
/// write side, so it waits for in-flight operations to finish, and because
/// the lock is write-preferring no new operation starts once `close` is
/// waiting.
#[derive(Debug, Default)]
pub(crate) struct ShutdownGate {
    closed: RwLock<bool>,
}

/// Held while one ledger operation runs.
pub(crate) type GatePass<'a> = RwLockReadGuard<'a, bool>;

impl ShutdownGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn enter(&self) -> LedgerResult<GatePass<'_>> {
        let pass = self.closed.read().await;
        if *pass {
            return Err(LedgerError::Closed);
        }
        Ok(pass)
    }

    /// Drain and close. Returns `false` if the gate was already closed.
    pub(crate) async fn close(&self) -> bool {
        let mut closed = self.closed.write().await;
        if *closed {
            return false;
        }
        *closed = true;
        true
    }
}
