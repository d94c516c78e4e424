//! Nested transactions.
//!
//! Only the outermost level talks to the backend: BEGIN on depth 0 → 1,
//! COMMIT/ROLLBACK on 1 → 0. Inner levels just move the depth counter.
//!
//! Any failed statement while a transaction is open clears the status flag.
//! [`Connection::transaction_complete`] then rolls back instead of
//! committing. Outside strict mode the flag is restored afterwards, so the
//! next, unrelated group starts clean; in strict mode it stays cleared until
//! [`Connection::clear_transaction_status`].

use super::Connection;
use crate::error::{DbError, DbResult};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub(crate) struct TransactionState {
    pub(crate) enabled: bool,
    pub(crate) strict: bool,
    pub(crate) depth: usize,
    /// Cleared by a failed statement.
    pub(crate) status: bool,
    /// Forced rollback (test mode, or a failed closure).
    pub(crate) failure: bool,
}

impl TransactionState {
    pub(crate) fn new(enabled: bool, strict: bool) -> Self {
        Self {
            enabled,
            strict,
            depth: 0,
            status: true,
            failure: false,
        }
    }

    /// Forget any open transaction, e.g. after the link was closed.
    pub(crate) fn reset(&mut self) {
        self.depth = 0;
        self.failure = false;
    }
}

impl Connection {
    /// Start a transaction, or a nested level of the current one.
    pub fn transaction_begin(&mut self) -> bool {
        self.begin_with(false)
    }

    /// Like [`transaction_begin`](Self::transaction_begin), but the group is
    /// rolled back at [`transaction_complete`](Self::transaction_complete)
    /// whatever happens.
    pub fn transaction_begin_test(&mut self) -> bool {
        self.begin_with(true)
    }

    fn begin_with(&mut self, test_mode: bool) -> bool {
        if !self.trans.enabled {
            return false;
        }
        if self.trans.depth > 0 {
            self.trans.depth += 1;
            return true;
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        self.trans.failure = test_mode;
        match link.begin() {
            Ok(()) => {
                self.trans.depth = 1;
                debug!(target: "dbkit", test_mode, "transaction started");
                true
            }
            Err(err) => {
                warn!(target: "dbkit", error = %err, "BEGIN failed");
                false
            }
        }
    }

    /// Commit the outermost level; inner levels only decrement the depth.
    pub fn transaction_commit(&mut self) -> bool {
        if !self.trans.enabled || self.trans.depth == 0 {
            return false;
        }
        if self.trans.depth > 1 {
            self.trans.depth -= 1;
            return true;
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.commit() {
            Ok(()) => {
                self.trans.depth = 0;
                debug!(target: "dbkit", "transaction committed");
                true
            }
            Err(err) => {
                warn!(target: "dbkit", error = %err, "COMMIT failed");
                false
            }
        }
    }

    /// Roll back the outermost level; inner levels only decrement the depth.
    pub fn transaction_rollback(&mut self) -> bool {
        if !self.trans.enabled || self.trans.depth == 0 {
            return false;
        }
        if self.trans.depth > 1 {
            self.trans.depth -= 1;
            return true;
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.rollback() {
            Ok(()) => {
                self.trans.depth = 0;
                debug!(target: "dbkit", "transaction rolled back");
                true
            }
            Err(err) => {
                warn!(target: "dbkit", error = %err, "ROLLBACK failed");
                false
            }
        }
    }

    /// Commit when every statement since the begin succeeded, otherwise
    /// roll back and return false.
    pub fn transaction_complete(&mut self) -> bool {
        if !self.trans.enabled {
            return false;
        }
        if !self.trans.status || self.trans.failure {
            self.transaction_rollback();
            if !self.trans.strict {
                self.trans.status = true;
            }
            return false;
        }
        self.transaction_commit()
    }

    /// Run `f` between a begin and a complete.
    ///
    /// An `Err` from `f` rolls the group back and is returned unchanged; a
    /// failed statement inside `f` yields [`DbError::Transaction`]. With
    /// transactions disabled `f` runs directly and its result is returned.
    pub fn transaction<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T>,
    {
        if !self.trans.enabled {
            return f(self);
        }
        if !self.transaction_begin() {
            return Err(DbError::transaction("transaction could not be started"));
        }
        match f(self) {
            Ok(value) => {
                if self.transaction_complete() {
                    Ok(value)
                } else {
                    Err(DbError::transaction(
                        "transaction rolled back after a failed statement",
                    ))
                }
            }
            Err(err) => {
                if self.trans.depth > 0 {
                    self.trans.failure = true;
                    self.transaction_complete();
                }
                Err(err)
            }
        }
    }

    /// Roll back every open level. Used before surfacing a statement error.
    pub(crate) fn unwind_transactions(&mut self) {
        if self.trans.depth > 0 {
            self.trans.failure = true;
        }
        while self.trans.depth > 0 {
            let depth = self.trans.depth;
            self.transaction_complete();
            if self.trans.depth == depth {
                break;
            }
        }
    }

    /// False once a statement failed inside the current (or, in strict
    /// mode, an earlier) transaction group.
    pub fn transaction_status(&self) -> bool {
        self.trans.status
    }

    pub fn transaction_depth(&self) -> usize {
        self.trans.depth
    }

    pub fn transaction_enable(&mut self) {
        self.trans.enabled = true;
    }

    /// Turn transactions off. begin/commit/rollback/complete then touch
    /// nothing and return false; [`transaction`](Self::transaction) runs its
    /// block without a surrounding transaction.
    pub fn transaction_disable(&mut self) {
        self.trans.enabled = false;
    }

    pub fn is_transaction_enabled(&self) -> bool {
        self.trans.enabled
    }

    /// Keep a failed status across groups until it is cleared explicitly.
    pub fn set_strict(&mut self, strict: bool) {
        self.trans.strict = strict;
    }

    /// Restore the status flag after a failure (needed in strict mode).
    pub fn clear_transaction_status(&mut self) {
        self.trans.status = true;
        self.trans.failure = false;
    }
}
