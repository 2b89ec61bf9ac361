//! Drain the coordinator alongside another subsystem's shutdown.

use std::future::Future;

use crate::drain::coordinator::Coordinator;
use crate::drain::deadline::Deadline;
use crate::drain::error::{BoxError, ShutdownErrors};

/// Run the coordinator drain and `external` concurrently under the same
/// deadline, wait for both, and report every failure.
///
/// `external` is typically the listener's own shutdown, which stops new
/// connections but cannot see handlers that took over their connection.
/// If `external` outlives the deadline it is dropped and reported as
/// [`DrainError::DeadlineExceeded`](crate::drain::DrainError::DeadlineExceeded)
/// (or `Cancelled`) on the external side.
pub async fn join_with_external_shutdown<F, E>(
    coordinator: &Coordinator,
    deadline: Deadline,
    external: F,
) -> Result<(), ShutdownErrors>
where
    F: Future<Output = Result<(), E>>,
    E: Into<BoxError>,
{
    let (drain, external) = tokio::join!(
        coordinator.shutdown(deadline.clone()),
        deadline.run(external),
    );

    let external = match external {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(expired) => Err(BoxError::from(expired)),
    };
    ShutdownErrors::from_results(drain, external)
}
