//! Operation executor shared by the Provisioner, Rectifier and RoleManager.
//!
//! Runs planned operations one at a time against a [`PlatformCatalog`],
//! enforcing the per-operation timeout and checking the cancellation flag
//! before each round-trip. Completed operations are appended to the caller's
//! record list even when a later operation fails.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RbacError, Result};
use crate::operation::Operation;
use crate::ports::{OpOutcome, PlatformCatalog, PlatformError, PlatformResult};

/// Caller-owned cancellation switch. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    pub operation_timeout: Option<Duration>,
    pub cancellation: CancellationFlag,
}

impl ExecutionControl {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            operation_timeout: Some(timeout),
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }
}

/// One executed operation and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: Operation,
    pub outcome: OpOutcome,
}

pub struct Executor<'a> {
    platform: &'a dyn PlatformCatalog,
    control: &'a ExecutionControl,
}

impl<'a> Executor<'a> {
    pub fn new(platform: &'a dyn PlatformCatalog, control: &'a ExecutionControl) -> Self {
        Self { platform, control }
    }

    pub fn platform(&self) -> &'a dyn PlatformCatalog {
        self.platform
    }

    /// Fail fast when the caller has cancelled.
    pub fn check_cancelled(&self, before: &str) -> Result<()> {
        if self.control.cancellation.is_cancelled() {
            return Err(RbacError::Cancelled(before.to_string()));
        }
        Ok(())
    }

    /// Execute a single operation under the configured deadline.
    pub async fn run_one(&self, operation: &Operation) -> Result<OpOutcome> {
        self.check_cancelled(operation.label())?;
        debug!(op = operation.label(), "{}", operation);

        let call = self.platform.execute(operation);
        let result = match self.control.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(op = operation.label(), "platform operation timed out");
                    return Err(RbacError::Timeout {
                        operation: operation.to_string(),
                        after_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => call.await,
        };

        result.map_err(|e| {
            warn!(op = operation.label(), error = %e, "platform operation failed");
            RbacError::PlatformOperationFailed {
                operation: operation.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Run a catalog read under the same deadline and cancellation rules.
    pub async fn query<T, F>(&self, what: &str, read: F) -> Result<T>
    where
        F: Future<Output = PlatformResult<T>>,
    {
        self.check_cancelled(what)?;
        let result = match self.control.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| RbacError::Timeout {
                    operation: what.to_string(),
                    after_ms: limit.as_millis() as u64,
                })?,
            None => read.await,
        };
        result.map_err(|e| introspection_error(what, e))
    }

    /// Execute operations in order, stopping at the first failure.
    pub async fn run_all(&self, operations: &[Operation], records: &mut Vec<OperationRecord>) -> Result<()> {
        for operation in operations {
            let outcome = self.run_one(operation).await?;
            records.push(OperationRecord {
                operation: operation.clone(),
                outcome,
            });
        }
        Ok(())
    }
}

/// Map a platform introspection error onto the engine taxonomy.
pub(crate) fn introspection_error(what: &str, err: PlatformError) -> RbacError {
    RbacError::PlatformOperationFailed {
        operation: what.to_string(),
        message: err.to_string(),
    }
}
