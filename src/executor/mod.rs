//! Operation Executor
//!
//! Every administrative operation follows the same lifecycle:
//!
//! 1. Render every parameter (including connection parameters) into a concrete request
//! 2. Connect
//! 3. Run the operation body against the live handle
//! 4. Close the handle, whatever the body returned
//!
//! Mutating operations run their body through [`verify`]: the mutation is followed by
//! an authoritative read, and a predicate over that read decides the `success` flag.
//! A read that does not confirm the mutation is logged, never raised.
//!
//! No retries and no rollback: if the mutation succeeds and the verification read
//! fails, the whole operation fails.

use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::client::{AdminClient, ConnectionParams, Connector};
use crate::error::Result;
use crate::render::RenderContext;

pub mod collection;
pub mod database;

/// An administrative operation with raw (possibly templated) parameters
pub trait Operation {
    /// Fully rendered request, built before any network I/O
    type Request: Send + Sync;

    /// Typed result handed to the caller
    type Output: Serialize + Send;

    /// Stable operation name, used in logs and output envelopes
    const NAME: &'static str;

    /// Raw connection parameters for this invocation
    fn connection(&self) -> &ConnectionParams;

    /// Render and validate every operation parameter
    fn render(&self, ctx: &RenderContext) -> Result<Self::Request>;

    /// Operation body, run against a live handle
    fn run<C: AdminClient>(
        request: &Self::Request,
        client: &mut C,
    ) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Run an operation end to end
///
/// Rendering happens first, so a validation failure never opens a connection.
/// Once connected, the handle is closed on every exit path.
pub async fn execute<O, K>(operation: &O, connector: &K, ctx: &RenderContext) -> Result<O::Output>
where
    O: Operation,
    K: Connector,
{
    let request = operation.render(ctx)?;
    let descriptor = operation.connection().render(ctx)?;

    debug!(operation = O::NAME, uri = %descriptor.uri, "Connecting");
    let mut client = connector.connect(&descriptor).await?;

    let start = Instant::now();
    let outcome = O::run(&request, &mut client).await;
    client.close().await;

    debug!(
        operation = O::NAME,
        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        ok = outcome.is_ok(),
        "Operation finished"
    );
    outcome
}

/// State read back after a mutation, with the comparison verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified<T> {
    pub state: T,
    pub confirmed: bool,
}

/// Mutate, read back, compare
///
/// Errors from either call propagate unchanged. A `false` verdict from `confirm`
/// is logged at error level and returned as `confirmed = false`.
pub async fn verify<T, M, R, F>(operation: &str, mutation: M, read: R, confirm: F) -> Result<Verified<T>>
where
    M: Future<Output = Result<()>>,
    R: Future<Output = Result<T>>,
    F: FnOnce(&T) -> bool,
{
    mutation.await?;
    let state = read.await?;

    let confirmed = confirm(&state);
    if confirmed {
        info!(operation, "Verified");
    } else {
        error!(operation, "Verification read does not reflect the requested change");
    }

    Ok(Verified { state, confirmed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MilvusError;

    #[tokio::test]
    async fn test_verify_confirmed() {
        let verified = verify("op", async { Ok(()) }, async { Ok(vec!["db1"]) }, |names| {
            names.contains(&"db1")
        })
        .await
        .unwrap();

        assert!(verified.confirmed);
        assert_eq!(verified.state, vec!["db1"]);
    }

    #[tokio::test]
    async fn test_verify_mismatch_is_not_an_error() {
        let verified =
            verify("op", async { Ok(()) }, async { Ok(3) }, |value| *value == 4).await.unwrap();
        assert!(!verified.confirmed);
    }

    #[tokio::test]
    async fn test_verify_mutation_failure_skips_read() {
        let read_ran = std::cell::Cell::new(false);
        let result = verify(
            "op",
            async { Err(MilvusError::transport("op", "rejected")) },
            async {
                read_ran.set(true);
                Ok(())
            },
            |()| true,
        )
        .await;

        assert_eq!(result.unwrap_err().error_code(), "TRANSPORT_ERROR");
        assert!(!read_ran.get());
    }

    #[tokio::test]
    async fn test_verify_read_failure_fails_operation() {
        let result: Result<Verified<()>> = verify(
            "op",
            async { Ok(()) },
            async { Err(MilvusError::transport("op", "read failed")) },
            |()| true,
        )
        .await;

        assert!(result.is_err());
    }
}
