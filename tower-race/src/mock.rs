//! Synthetic load generator: many simulated users answering over HTTP.

use std::time::Duration;

use race_core::Submission;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_CORRECT_RATIO: f64 = 0.2;

#[derive(Clone, Debug)]
pub struct Options {
    /// Number of simulated users. User ids run from `1` to `users`.
    pub users: usize,
    /// e.g. `http://localhost:8080`
    pub base_url: String,
    /// Shortest simulated network lag.
    pub min_delay: Duration,
    /// Longest simulated network lag.
    pub max_delay: Duration,
    /// Approximate probability that a user answers correctly.
    pub correct_ratio: f64,
    /// RNG seed. `None` picks a random one, which is logged.
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            users: 1000,
            base_url: "http://localhost:8080".to_string(),
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: Duration::from_millis(1000),
            correct_ratio: DEFAULT_CORRECT_RATIO,
            seed: None,
        }
    }
}

impl Options {
    fn normalized(mut self) -> Self {
        if self.min_delay.is_zero() {
            self.min_delay = DEFAULT_MIN_DELAY;
        }
        if self.max_delay < self.min_delay {
            self.max_delay = self.min_delay;
        }
        if !(self.correct_ratio > 0.0 && self.correct_ratio <= 1.0) {
            self.correct_ratio = DEFAULT_CORRECT_RATIO;
        }
        self
    }
}

/// One simulated user's answer and when it will be sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Planned {
    pub delay: Duration,
    pub submission: Submission,
}

/// Outcome counts for a load generator run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Requests the server accepted.
    pub sent: usize,
    /// Requests that errored or were refused. They are not retried.
    pub failed: usize,
    /// Users that never sent because the run was cancelled first.
    pub cancelled: usize,
}

enum Outcome {
    Sent,
    Failed,
    Cancelled,
}

/// Decide every user's answer and lag up front.
///
/// One randomly chosen user always answers correctly, so a run always produces a
/// winner. The same seed yields the same plan.
pub fn plan(options: &Options) -> Vec<Planned> {
    let options = options.clone().normalized();
    if options.users == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(options.seed.unwrap_or_else(|| rand::rng().random()));
    let span = (options.max_delay - options.min_delay).as_nanos() as u64;
    let guaranteed = rng.random_range(1..=options.users);

    (1..=options.users)
        .map(|user| {
            let delay = options.min_delay + Duration::from_nanos(rng.random_range(0..=span));
            let correct = rng.random::<f64>() < options.correct_ratio || user == guaranteed;
            Planned {
                delay,
                submission: Submission::new(user as i64, correct),
            }
        })
        .collect()
}

/// Fire one concurrent submission per simulated user and wait for all of them.
///
/// Users still waiting out their lag when `cancel` fires never send.
///
/// # Errors
///
/// Fails only if the HTTP client cannot be built.
pub async fn run(cancel: CancellationToken, options: Options) -> Result<Report, reqwest::Error> {
    let mut options = options.normalized();
    let seed = *options.seed.get_or_insert_with(|| rand::rng().random());
    info!(users = options.users, seed, "starting simulated users");

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(2048)
        .pool_idle_timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(3))
        .build()?;
    let url = format!("{}/submit", options.base_url.trim_end_matches('/'));

    let mut tasks = JoinSet::new();
    for planned in plan(&options) {
        let client = client.clone();
        let url = url.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = sleep(planned.delay) => {}
            }

            let user = planned.submission.subject_id;
            match client
                .post(&url)
                .json(&planned.submission)
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
            {
                Ok(_) => Outcome::Sent,
                Err(err) => {
                    warn!(user, error = %err, "submission request failed");
                    Outcome::Failed
                }
            }
        });
    }

    let mut report = Report::default();
    while let Some(outcome) = tasks.join_next().await {
        match outcome {
            Ok(Outcome::Sent) => report.sent += 1,
            Ok(Outcome::Failed) | Err(_) => report.failed += 1,
            Ok(Outcome::Cancelled) => report.cancelled += 1,
        }
    }
    Ok(report)
}
