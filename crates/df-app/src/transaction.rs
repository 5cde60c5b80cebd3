//! Transaction coordination.
//!
//! One evaluation pass batches all of its document mutations into a single
//! transaction. The coordinator tracks whether that transaction is open so
//! repeated `begin` calls during a pass reuse it.

use std::sync::Arc;

use df_core::{Document, DocumentResult};

use crate::log::LogSink;

/// How the transaction of the current pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Triggered by an edit or document change with dynamic run on.
    Automatic,
    /// Requested explicitly.
    Manual,
    /// Debug mode; evaluation runs on the mutation context.
    Debug,
}

pub struct TransactionCoordinator {
    document: Arc<dyn Document>,
    name: String,
    mode: TransactionMode,
    active: bool,
    commits: usize,
    rollbacks: usize,
}

impl TransactionCoordinator {
    pub fn new(document: Arc<dyn Document>, name: impl Into<String>) -> Self {
        Self {
            document,
            name: name.into(),
            mode: TransactionMode::Manual,
            active: false,
            commits: 0,
            rollbacks: 0,
        }
    }

    /// Open a transaction unless one is already active.
    pub fn begin(&mut self) -> DocumentResult<()> {
        if self.active {
            return Ok(());
        }
        self.document.start_transaction(&self.name)?;
        self.active = true;
        tracing::debug!(name = %self.name, mode = ?self.mode, "transaction started");
        Ok(())
    }

    /// Commit the active transaction. Returns `Ok(false)` when none is open.
    ///
    /// A commit the document refuses is rolled back and the error returned.
    /// Warnings the document reports are written to `log`.
    pub fn commit(&mut self, log: &dyn LogSink) -> DocumentResult<bool> {
        if !self.active {
            return Ok(false);
        }
        self.active = false;
        match self.document.commit_transaction() {
            Ok(warnings) => {
                for warning in warnings {
                    log.log_line(&format!("Warning: {}", warning));
                }
                self.commits += 1;
                tracing::debug!(name = %self.name, "transaction committed");
                Ok(true)
            }
            Err(err) => {
                self.document.rollback_transaction();
                self.rollbacks += 1;
                tracing::error!(name = %self.name, error = %err, "commit rejected, rolled back");
                Err(err)
            }
        }
    }

    /// Discard everything since `begin`. Returns false when none was open.
    pub fn rollback(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.document.rollback_transaction();
        self.active = false;
        self.rollbacks += 1;
        tracing::debug!(name = %self.name, "transaction rolled back");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TransactionMode) {
        self.mode = mode;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }
}
