use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::PollSender;
use tracing::debug;

use crate::Submission;
use crate::counters::Counters;
use crate::counters::Stats;
use crate::error::StartError;
use crate::error::SubmitError;
use crate::winner::Announcer;
use crate::winner::WinnerEvent;
use crate::winner::WinnerSlot;

#[derive(Debug)]
struct Shared {
    counters: Counters,
    winner: WinnerSlot,
    announcer: Announcer,
    // Handed to the evaluation loop exactly once, by `start`.
    receiver: Mutex<Option<mpsc::Receiver<Submission>>>,
}

impl Shared {
    fn evaluate(&self, submission: Submission) {
        self.counters.record(submission.correct);
        if !submission.correct {
            return;
        }
        self.winner.declare(submission.subject_id);
        // The announcement latch is independent of the CAS outcome and always
        // publishes whatever the slot holds.
        if let Some(id) = self.winner.get() {
            self.announcer.announce(id);
        }
    }
}

/// The submission-evaluation engine.
///
/// Cloning is cheap and every clone refers to the same queue, counters and winner.
/// Hand clones to as many producers and observers as needed.
#[derive(Clone, Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Submission>,
}

impl Engine {
    /// Creates an engine whose ingress queue holds up to `capacity` submissions.
    ///
    /// Submissions made before [`Engine::start`] are buffered and evaluated once the
    /// loop runs.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.get());
        Self {
            shared: Arc::new(Shared {
                counters: Counters::default(),
                winner: WinnerSlot::new(),
                announcer: Announcer::new(),
                receiver: Mutex::new(Some(receiver)),
            }),
            sender,
        }
    }

    /// Spawns the evaluation loop onto the current tokio runtime.
    ///
    /// When `cancel` fires, the queue is closed, which releases every producer still
    /// waiting for room with [`SubmitError::Stopped`]. Submissions already accepted
    /// are then evaluated, and the returned handle resolves once that drain is
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::AlreadyStarted`] on any call after the first.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, StartError> {
        let receiver = self
            .shared
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StartError::AlreadyStarted)?;

        Ok(tokio::spawn(evaluation_loop(
            Arc::clone(&self.shared),
            receiver,
            cancel,
        )))
    }

    /// Enqueue a submission, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Stopped`] if the engine has stopped, including when it
    /// stops while this call is waiting.
    pub async fn submit(&self, submission: Submission) -> Result<(), SubmitError> {
        self.sender
            .send(submission)
            .await
            .map_err(|SendError(submission)| SubmitError::Stopped(submission))
    }

    /// Enqueue a submission only if there is room right now.
    pub fn try_submit(&self, submission: Submission) -> Result<(), SubmitError> {
        self.sender.try_send(submission).map_err(|err| match err {
            TrySendError::Full(submission) => SubmitError::Full(submission),
            TrySendError::Closed(submission) => SubmitError::Stopped(submission),
        })
    }

    /// Enqueue from a thread outside the async runtime, blocking while the queue is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_submit(&self, submission: Submission) -> Result<(), SubmitError> {
        self.sender
            .blocking_send(submission)
            .map_err(|SendError(submission)| SubmitError::Stopped(submission))
    }

    /// A pollable handle onto the ingress queue.
    ///
    /// Lets a caller reserve a queue slot from a `poll_*` method and surface a full
    /// queue as `Poll::Pending`.
    pub fn sender(&self) -> PollSender<Submission> {
        PollSender::new(self.sender.clone())
    }

    /// The winning subject, if one has been declared. Never blocks.
    pub fn winner(&self) -> Option<i64> {
        self.shared.winner.get()
    }

    /// Current counters and winner. Never blocks.
    pub fn snapshot(&self) -> Stats {
        self.shared.counters.snapshot(self.shared.winner.get())
    }

    /// Subscribe to the one-shot winner announcement.
    ///
    /// Returns `None` once the announcement has already been made, or the engine has
    /// stopped. Late observers should call [`Engine::winner`] instead.
    pub fn subscribe_winner(&self) -> Option<WinnerEvent> {
        self.shared.announcer.subscribe()
    }

    /// Maximum number of submissions the queue holds.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// `true` once the evaluation loop has stopped accepting submissions.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }
}

async fn evaluation_loop(
    shared: Arc<Shared>,
    mut receiver: mpsc::Receiver<Submission>,
    cancel: CancellationToken,
) {
    debug!("evaluation loop started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            next = receiver.recv() => match next {
                Some(submission) => shared.evaluate(submission),
                // Every producer handle is gone
                None => break,
            },
        }
    }

    // Closing wakes blocked producers with an error; what was accepted is drained.
    receiver.close();
    let mut drained = 0u64;
    while let Some(submission) = receiver.recv().await {
        shared.evaluate(submission);
        drained += 1;
    }
    shared.announcer.close();

    debug!(drained, "evaluation loop stopped");
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use more_asserts::assert_ge;

    use super::*;

    fn engine(capacity: usize) -> Engine {
        Engine::new(NonZeroUsize::new(capacity).unwrap())
    }

    /// Cancel and wait for every accepted submission to be evaluated.
    async fn drain(cancel: CancellationToken, evaluator: JoinHandle<()>) {
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), evaluator)
            .await
            .expect("evaluation loop should stop promptly")
            .expect("evaluation loop panicked");
    }

    #[tokio::test]
    async fn it_declares_the_first_correct_submitter() {
        let engine = engine(10);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        engine.submit(Submission::new(1, false)).await.unwrap();
        engine.submit(Submission::new(2, true)).await.unwrap();
        engine.submit(Submission::new(3, true)).await.unwrap();
        drain(cancel, evaluator).await;

        assert_eq!(
            engine.snapshot(),
            Stats {
                total: 3,
                correct: 2,
                incorrect: 1,
                winner_id: Some(2),
            }
        );
        assert_eq!(engine.winner(), Some(2));
    }

    #[tokio::test]
    async fn it_has_no_winner_without_a_correct_answer() {
        let engine = engine(4);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        for id in 1..=3 {
            engine.submit(Submission::new(id, false)).await.unwrap();
        }
        drain(cancel, evaluator).await;

        let stats = engine.snapshot();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.incorrect, 3);
        assert_eq!(stats.winner_id, None);
        assert_eq!(engine.winner(), None);
    }

    #[tokio::test]
    async fn test_counter_invariants_over_a_long_sequence() {
        let engine = engine(64);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        // Deterministic pseudo-random outcomes
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut sent = Vec::new();
        for id in 1..=500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let submission = Submission::new(id, seed % 7 == 0);
            engine.submit(submission).await.unwrap();
            sent.push(submission);
        }
        drain(cancel, evaluator).await;

        let stats = engine.snapshot();
        let expected_correct = sent.iter().filter(|s| s.correct).count() as u64;
        assert_eq!(stats.total, 500);
        assert_eq!(stats.total, stats.correct + stats.incorrect);
        assert_eq!(stats.correct, expected_correct);
        if stats.correct >= 1 {
            let first = sent.iter().find(|s| s.correct).map(|s| s.subject_id);
            assert_eq!(engine.winner(), first);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_correct_among_many_concurrent_producers() {
        let engine = engine(16);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        let mut producers = tokio::task::JoinSet::new();
        for id in 1..=100 {
            let engine = engine.clone();
            producers.spawn(async move { engine.submit(Submission::new(id, false)).await });
        }
        let winner_engine = engine.clone();
        producers.spawn(async move { winner_engine.submit(Submission::new(777, true)).await });

        while let Some(result) = producers.join_next().await {
            result.expect("producer panicked").expect("submit failed");
        }
        drain(cancel, evaluator).await;

        let stats = engine.snapshot();
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.total, 101);
        assert_eq!(engine.winner(), Some(777));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_correct_in_queue_order_wins() {
        let engine = engine(256);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        // The mutex makes the recorded order identical to the queue order.
        let order = Arc::new(Mutex::new(Vec::new()));
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8i64)
            .map(|producer| {
                let engine = engine.clone();
                let order = Arc::clone(&order);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..16i64 {
                        let submission = Submission::new(producer * 100 + i + 1, i % 3 == 2);
                        let mut order = order.lock().unwrap();
                        engine.blocking_submit(submission).unwrap();
                        order.push(submission);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread panicked");
        }
        drain(cancel, evaluator).await;

        let order = order.lock().unwrap();
        let expected = order.iter().find(|s| s.correct).map(|s| s.subject_id);
        let stats = engine.snapshot();
        assert_eq!(stats.total, 128);
        assert_eq!(
            stats.correct,
            order.iter().filter(|s| s.correct).count() as u64
        );
        assert_ge!(stats.correct, 1);
        assert_eq!(engine.winner(), expected);
    }

    #[tokio::test]
    async fn test_winner_never_changes_once_declared() {
        let engine = engine(8);
        let event = engine.subscribe_winner().expect("no winner yet");
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        engine.submit(Submission::new(5, true)).await.unwrap();
        assert_eq!(event.recv().await, Some(5));

        for id in 6..=20 {
            engine.submit(Submission::new(id, id % 2 == 0)).await.unwrap();
            assert_eq!(engine.winner(), Some(5));
        }
        drain(cancel, evaluator).await;

        assert_eq!(engine.winner(), Some(5));
        assert_eq!(engine.snapshot().winner_id, Some(5));
    }

    #[tokio::test]
    async fn test_pre_declaration_subscribers_get_one_notification() {
        let engine = engine(10);
        let first = engine.subscribe_winner().expect("no winner yet");
        let second = engine.subscribe_winner().expect("no winner yet");
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        engine.submit(Submission::new(1, false)).await.unwrap();
        engine.submit(Submission::new(2, true)).await.unwrap();
        engine.submit(Submission::new(3, true)).await.unwrap();

        let announced = tokio::time::timeout(Duration::from_secs(1), first.recv())
            .await
            .expect("winner should be announced");
        assert_eq!(announced, Some(2));
        assert_eq!(announced, engine.winner());
        assert_eq!(second.recv().await, Some(2));

        // Already delivered: late observers go through the query path
        assert!(engine.subscribe_winner().is_none());
        drain(cancel, evaluator).await;
    }

    #[tokio::test]
    async fn test_subscriber_released_when_stopped_without_winner() {
        let engine = engine(4);
        let event = engine.subscribe_winner().expect("no winner yet");
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        engine.submit(Submission::new(1, false)).await.unwrap();
        drain(cancel, evaluator).await;

        assert_eq!(event.recv().await, None);
        assert!(engine.subscribe_winner().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_the_loop_runs() {
        let engine = engine(2);
        engine.submit(Submission::new(10, false)).await.unwrap();
        engine.submit(Submission::new(20, true)).await.unwrap();

        let producer = engine.clone();
        let mut blocked =
            tokio::spawn(async move { producer.submit(Submission::new(30, true)).await });

        tokio::select! {
            _ = &mut blocked => panic!("submit should wait on a full queue"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        assert_eq!(
            engine.try_submit(Submission::new(40, false)),
            Err(SubmitError::Full(Submission::new(40, false)))
        );

        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("starting the loop should make room")
            .expect("producer panicked")
            .expect("submit should be accepted");
        drain(cancel, evaluator).await;

        let stats = engine.snapshot();
        assert_eq!(stats.total, 3);
        // 20 was evaluated before 30
        assert_eq!(engine.winner(), Some(20));
    }

    #[tokio::test]
    async fn test_stop_releases_blocked_producers() {
        let engine = engine(1);
        engine.submit(Submission::new(1, true)).await.unwrap();

        let producer = engine.clone();
        let blocked = tokio::spawn(async move { producer.submit(Submission::new(2, true)).await });
        tokio::task::yield_now().await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let evaluator = engine.start(cancel.clone()).unwrap();
        drain(cancel, evaluator).await;

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("blocked producer should be released")
            .expect("producer panicked");
        assert_eq!(result, Err(SubmitError::Stopped(Submission::new(2, true))));

        // Accepted work was drained, the rejected submission was never counted
        assert_eq!(engine.snapshot().total, 1);
        assert_eq!(engine.winner(), Some(1));
        assert!(engine.is_stopped());
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_rejected() {
        let engine = engine(4);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();
        drain(cancel, evaluator).await;

        let err = engine.submit(Submission::new(9, true)).await.unwrap_err();
        assert_eq!(err, SubmitError::Stopped(Submission::new(9, true)));
        assert_eq!(err.into_inner().subject_id, 9);
        assert!(matches!(
            engine.try_submit(Submission::new(10, true)),
            Err(SubmitError::Stopped(_))
        ));
        assert_eq!(engine.snapshot().total, 0);
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let engine = engine(4);
        let cancel = CancellationToken::new();
        let evaluator = engine.start(cancel.clone()).unwrap();

        assert_eq!(
            engine.clone().start(cancel.clone()).unwrap_err(),
            StartError::AlreadyStarted
        );
        assert_eq!(engine.capacity(), 4);
        assert!(!engine.is_stopped());
        drain(cancel, evaluator).await;
    }
}
