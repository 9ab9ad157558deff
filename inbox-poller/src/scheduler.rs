use std::sync::Arc;
use std::time::Duration;

use futures::{future, stream, StreamExt};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::StoreError;
use crate::processor::{MailboxProcessor, MailboxReport};
use crate::store::ApplicationStore;

/// Outcome of one pass over every listening user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub users: usize,
    pub users_failed: usize,
    /// Users never started because shutdown was requested.
    pub users_skipped: usize,
    pub mailboxes: MailboxReport,
}

/// Time to sleep so that cycles start a fixed interval apart.
pub fn sleep_after(elapsed: Duration, interval: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

pub struct PollScheduler {
    store: Arc<dyn ApplicationStore>,
    processor: Arc<MailboxProcessor>,
    config: SchedulerConfig,
    consecutive_failures: u32,
}

impl PollScheduler {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        processor: Arc<MailboxProcessor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            processor,
            config,
            consecutive_failures: 0,
        }
    }

    /// Poll until `shutdown` fires. A cycle in progress is never interrupted;
    /// shutdown only stops new users from starting.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            interval = ?self.config.poll_interval,
            max_concurrent_users = self.config.max_concurrent_users,
            "Poll scheduler started"
        );

        while !shutdown.is_cancelled() {
            let started = Instant::now();
            let outcome = self.run_cycle(&shutdown).await;
            let pause = self.next_pause(&outcome, started.elapsed());

            tracing::debug!(?pause, "Sleeping until next cycle");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = time::sleep(pause) => {}
            }
        }

        tracing::info!("Poll scheduler stopped");
    }

    /// One pass: list users, then check each mailbox on the bounded pool.
    ///
    /// Fails only when the user list cannot be fetched. Per-user failures are
    /// counted in the report.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, StoreError> {
        let span = tracing::info_span!("poll_cycle", cycle_id = %Uuid::new_v4());

        async {
            let users = self.store.list_listening_users().await?;
            tracing::debug!(users = users.len(), "Fetched listening users");

            let mut report = CycleReport {
                users: users.len(),
                ..CycleReport::default()
            };

            let outcomes: Vec<_> = stream::iter(users)
                .take_while(|_| future::ready(!shutdown.is_cancelled()))
                .map(|user| {
                    let span = tracing::info_span!("mailbox", owner = %user.email);
                    async move {
                        let result = self.processor.check_inbox(&user).await;
                        if let Err(e) = &result {
                            tracing::error!(error = %e, "Mailbox check failed, skipping user");
                        }
                        result
                    }
                    .instrument(span)
                })
                .buffer_unordered(self.config.max_concurrent_users.max(1))
                .collect()
                .await;

            report.users_skipped = report.users - outcomes.len();
            for outcome in outcomes {
                match outcome {
                    Ok(mailbox) => report.mailboxes += mailbox,
                    Err(_) => report.users_failed += 1,
                }
            }

            if report.users_skipped > 0 {
                tracing::info!(
                    skipped = report.users_skipped,
                    "Shutdown requested, skipped remaining users"
                );
            }
            tracing::info!(
                users = report.users,
                users_failed = report.users_failed,
                unseen = report.mailboxes.unseen,
                created = report.mailboxes.created,
                updated = report.mailboxes.updated,
                ignored = report.mailboxes.ignored,
                message_failures = report.mailboxes.failures(),
                "Poll cycle complete"
            );

            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn next_pause(
        &mut self,
        outcome: &Result<CycleReport, StoreError>,
        elapsed: Duration,
    ) -> Duration {
        let error = match outcome {
            Ok(_) => {
                self.consecutive_failures = 0;
                return sleep_after(elapsed, self.config.poll_interval);
            }
            Err(e) => e,
        };

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_failures {
            tracing::error!(
                failures = self.consecutive_failures,
                cooldown = ?self.config.failure_cooldown,
                error = %error,
                "Application Store unreachable, cooling down"
            );
            // Back to normal polling after the cool-down.
            self.consecutive_failures = 0;
            return self.config.failure_cooldown;
        }

        tracing::warn!(
            failures = self.consecutive_failures,
            max_failures = self.config.max_failures,
            error = %error,
            operation = "list-listening-users",
            "Failed to fetch listening users"
        );
        sleep_after(elapsed, self.config.poll_interval)
    }
}
