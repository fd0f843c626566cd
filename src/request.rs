//! Handles for non-blocking operations.

use crate::{error::Result, status::Status};

type Completion<'a> = Box<dyn FnOnce() -> Result<Option<Status>> + 'a>;

/// A handle to a non-blocking operation.
///
/// The request borrows the buffer of the operation until it is waited on, so
/// the buffer cannot be read or reused before the operation completed.
/// Sends are buffered by the transport and complete immediately. Receives
/// are matched against incoming messages in the order they were posted and
/// fill their buffer when [`wait`](Request::wait) is called.
///
/// A request that is dropped without being waited on completes itself.
///
/// # Example
///
/// ```
/// use parcomm::Communicator;
///
/// let comm = Communicator::serial();
/// let mut buf = vec![0u32; 4];
/// let request = comm.irecv(0, &mut buf, 0).unwrap();
/// assert!(request.wait().unwrap().is_none());
/// ```
#[must_use = "a request must be waited on"]
pub struct Request<'a> {
    pending: Option<Completion<'a>>,
    status: Option<Status>,
}

impl<'a> Request<'a> {
    /// A request that has already completed.
    pub(crate) fn completed(status: Option<Status>) -> Self {
        Self {
            pending: None,
            status,
        }
    }

    /// A request that completes by running `completion`.
    pub(crate) fn deferred<F>(completion: F) -> Self
    where
        F: FnOnce() -> Result<Option<Status>> + 'a,
    {
        Self {
            pending: Some(Box::new(completion)),
            status: None,
        }
    }

    /// Check if this request has been completed.
    pub fn is_completed(&self) -> bool {
        self.pending.is_none()
    }

    /// Blocks until the operation has completed.
    ///
    /// Returns the status of a receive, or `None` for sends and for
    /// operations of a single-process communicator.
    pub fn wait(mut self) -> Result<Option<Status>> {
        match self.pending.take() {
            Some(completion) => completion(),
            None => Ok(self.status),
        }
    }

    /// Waits for all requests to complete.
    ///
    /// Every request is completed even if an earlier one fails; the first
    /// error is returned.
    pub fn wait_all(requests: Vec<Request<'a>>) -> Result<Vec<Option<Status>>> {
        let mut statuses = Vec::with_capacity(requests.len());
        let mut first_error = None;
        for request in requests {
            match request.wait() {
                Ok(status) => statuses.push(status),
                Err(err) => {
                    statuses.push(None);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(statuses),
        }
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if let Some(completion) = self.pending.take() {
            if std::thread::panicking() {
                return;
            }
            tracing::warn!("request dropped without waiting");
            if let Err(err) = completion() {
                tracing::error!("request failed while being dropped: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("completed", &self.is_completed())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[test]
    fn completed_request_returns_status() {
        let status = Status::new(1, 2, 3);
        let request = Request::completed(Some(status));
        assert!(request.is_completed());
        assert_eq!(request.wait().unwrap(), Some(status));
    }

    #[test]
    fn deferred_request_runs_on_wait() {
        let ran = Cell::new(false);
        let request = Request::deferred(|| {
            ran.set(true);
            Ok(None)
        });
        assert!(!request.is_completed());
        assert!(!ran.get());
        request.wait().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn dropped_request_completes() {
        let ran = Cell::new(false);
        drop(Request::deferred(|| {
            ran.set(true);
            Ok(None)
        }));
        assert!(ran.get());
    }

    #[test]
    fn wait_all_completes_everything() {
        let count = Cell::new(0);
        let requests = vec![
            Request::deferred(|| {
                count.set(count.get() + 1);
                Err(Error::Disconnected)
            }),
            Request::deferred(|| {
                count.set(count.get() + 1);
                Ok(Some(Status::new(0, 0, 1)))
            }),
        ];
        assert!(matches!(Request::wait_all(requests), Err(Error::Disconnected)));
        assert_eq!(count.get(), 2);
    }
}
