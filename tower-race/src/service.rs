use std::future::Future;
use std::future::Ready;
use std::future::ready;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::SystemTime;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use race_core::Engine;
use race_core::Submission;
use serde::Serialize;
use tokio::time::Sleep;
use tokio::time::sleep;
use tokio_util::sync::PollSender;
use tower::BoxError;
use tower::Service;

use crate::error::RaceError;

/// Acknowledgement that a submission entered the ingress queue.
///
/// Acceptance only means the submission will be evaluated, not that it won.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub status: &'static str,
    /// RFC 3339 time at which the submission was queued.
    pub queued_at: String,
}

impl Receipt {
    fn accepted() -> Self {
        Self {
            status: "accepted",
            queued_at: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct SubmitServiceMetrics {
    enqueued: Counter<u64>,
    rejected: Counter<u64>,
}

/// The leaf service in front of an [`Engine`]'s ingress queue.
///
/// `poll_ready` reserves a slot in the queue, so a full queue shows up as
/// `Poll::Pending` and callers are held back rather than dropped. `call` then moves
/// the submission into the reserved slot.
#[derive(Debug)]
pub struct SubmitService {
    sender: PollSender<Submission>,
    timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
    instruments: SubmitServiceMetrics,
}

// Manually implement Clone because Pin<Box<Sleep>> cannot be cloned
impl Clone for SubmitService {
    fn clone(&self) -> Self {
        Self {
            // A cloned PollSender starts without a reservation
            sender: self.sender.clone(),
            timeout: self.timeout,
            deadline: None,
            instruments: self.instruments.clone(),
        }
    }
}

impl Service<Submission> for SubmitService {
    type Response = Receipt;
    type Error = BoxError;
    type Future = Ready<Result<Receipt, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.sender.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {
                self.deadline = None;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(_)) => {
                self.deadline = None;
                self.reject("stopped");
                Poll::Ready(Err(Box::new(RaceError::Stopped)))
            }
            Poll::Pending => {
                let Some(timeout) = self.timeout else {
                    return Poll::Pending;
                };
                // The wait for a slot starts with the first Pending
                let deadline = self
                    .deadline
                    .get_or_insert_with(|| Box::pin(sleep(timeout)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        self.deadline = None;
                        self.sender.abort_send();
                        self.reject("timeout");
                        Poll::Ready(Err(Box::new(RaceError::Timeout)))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn call(&mut self, submission: Submission) -> Self::Future {
        let result = match self.sender.send_item(submission) {
            Ok(()) => {
                self.instruments.enqueued.add(1, &[]);
                Ok(Receipt::accepted())
            }
            Err(_) if self.sender.is_closed() => {
                self.reject("stopped");
                Err(BoxError::from(RaceError::Stopped))
            }
            Err(_) => Err(BoxError::from(RaceError::Inner(
                "call invoked without a reserved queue slot".to_string(),
            ))),
        };
        ready(result)
    }
}

impl SubmitService {
    pub fn new(engine: &Engine) -> Self {
        let meter = global::meter("submit_service");
        let instruments = SubmitServiceMetrics {
            enqueued: meter.u64_counter("submissions_enqueued").build(),
            rejected: meter.u64_counter("submissions_rejected").build(),
        };

        Self {
            sender: engine.sender(),
            timeout: None,
            deadline: None,
            instruments,
        }
    }

    /// Bound how long `poll_ready` waits for room in the queue.
    ///
    /// Once exceeded, readiness fails with `RaceError::Timeout` and the submission is
    /// never enqueued.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn reject(&self, reason: &'static str) {
        self.instruments
            .rejected
            .add(1, &[KeyValue::new("reason", reason)]);
    }
}
