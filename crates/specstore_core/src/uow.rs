//! Unit of work: the transactional boundary around one repository.
//!
//! # Responsibility
//! - Track the transaction state of one repository session.
//! - Provide a scoped guard that rolls back and closes on every exit path.
//!
//! # Invariants
//! - `begin` while active is a no-op; `commit` requires an active transaction.
//! - Nothing is committed implicitly.
//! - After `close`, every operation fails with `DataLayer`.

use crate::error::{DataError, DataResult};
use crate::repo::{DynRepository, Transactional};
use log::{error, info, warn};
use std::ops::Deref;

/// Transaction state of a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    Idle,
    Active,
    Committed,
    RolledBack,
    Closed,
}

impl UowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Closed => "closed",
        }
    }
}

/// Owns one repository and its transaction state.
pub struct UnitOfWork<R: Transactional> {
    repository: R,
    state: UowState,
}

/// Unit of work over a backend-erased repository.
pub type DynUnitOfWork<'s, M> = UnitOfWork<DynRepository<'s, M>>;

impl<R: Transactional> UnitOfWork<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            state: UowState::Idle,
        }
    }

    pub fn state(&self) -> UowState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == UowState::Active
    }

    /// The wrapped repository; fails once the unit of work is closed.
    pub fn repository(&self) -> DataResult<&R> {
        self.ensure_open("repository")?;
        Ok(&self.repository)
    }

    pub fn begin(&mut self) -> DataResult<()> {
        self.ensure_open("begin")?;
        if self.state == UowState::Active {
            return Ok(());
        }
        self.repository.begin()?;
        self.transition(UowState::Active);
        Ok(())
    }

    pub fn commit(&mut self) -> DataResult<()> {
        self.ensure_open("commit")?;
        if self.state != UowState::Active {
            return Err(DataError::data_layer(format!(
                "commit requires an active transaction, unit of work is {}",
                self.state.as_str()
            )));
        }
        self.repository.commit()?;
        self.transition(UowState::Committed);
        Ok(())
    }

    /// Rolls back the active transaction; a no-op when none is active.
    pub fn rollback(&mut self) -> DataResult<()> {
        self.ensure_open("rollback")?;
        if self.state != UowState::Active {
            return Ok(());
        }
        self.repository.rollback()?;
        self.transition(UowState::RolledBack);
        Ok(())
    }

    /// Rolls back an active transaction and releases the session.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> DataResult<()> {
        if self.state == UowState::Closed {
            return Ok(());
        }
        let rolled_back = self.rollback();
        let closed = self.repository.close();
        self.transition(UowState::Closed);
        rolled_back.and(closed)
    }

    /// Begins a transaction and returns a guard that rolls back and closes
    /// when dropped.
    pub fn enter(&mut self) -> DataResult<UnitOfWorkScope<'_, R>> {
        self.begin()?;
        Ok(UnitOfWorkScope { uow: self })
    }

    /// Runs `body` inside [`UnitOfWork::enter`]. The body must commit
    /// explicitly; anything left uncommitted is rolled back.
    pub fn run<T>(
        &mut self,
        body: impl FnOnce(&mut UnitOfWorkScope<'_, R>) -> DataResult<T>,
    ) -> DataResult<T> {
        let mut scope = self.enter()?;
        let result = body(&mut scope);
        if result.is_err() {
            if let Err(err) = scope.rollback() {
                warn!("event=uow_run module=uow status=error stage=rollback error={err}");
            }
        }
        result
    }

    fn ensure_open(&self, operation: &str) -> DataResult<()> {
        if self.state == UowState::Closed {
            return Err(DataError::data_layer(format!(
                "unit of work is closed; `{operation}` is not available"
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: UowState) {
        info!(
            "event=uow_transition module=uow status=ok from={} to={}",
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
    }

    fn release(&mut self) {
        if let Err(err) = self.close() {
            error!("event=uow_release module=uow status=error error={err}");
        }
    }
}

impl<R: Transactional> Drop for UnitOfWork<R> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scoped acquisition of a [`UnitOfWork`].
///
/// Dereferences to the repository. Dropping the scope rolls back anything
/// uncommitted and closes the unit of work, including during unwinding.
pub struct UnitOfWorkScope<'u, R: Transactional> {
    uow: &'u mut UnitOfWork<R>,
}

impl<R: Transactional> UnitOfWorkScope<'_, R> {
    pub fn commit(&mut self) -> DataResult<()> {
        self.uow.commit()
    }

    pub fn rollback(&mut self) -> DataResult<()> {
        self.uow.rollback()
    }

    /// Starts a new transaction after a commit or rollback.
    pub fn begin(&mut self) -> DataResult<()> {
        self.uow.begin()
    }

    pub fn state(&self) -> UowState {
        self.uow.state
    }

    pub fn repository(&self) -> &R {
        &self.uow.repository
    }
}

impl<R: Transactional> Deref for UnitOfWorkScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.uow.repository
    }
}

impl<R: Transactional> Drop for UnitOfWorkScope<'_, R> {
    fn drop(&mut self) {
        self.uow.release();
    }
}
