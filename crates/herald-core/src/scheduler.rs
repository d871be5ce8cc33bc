//! The shared timer service behind delayed, predicate-gated deliveries.
//!
//! One [`Scheduler`] multiplexes any number of scheduled sends. Each send
//! gets its own tokio task that sleeps out its delay independently: there is
//! no global tick and no lock held across the timer wait, so slow predicate
//! I/O or delivery on one send never blocks another.
//!
//! Per send the state machine is `Pending -> {Fired, Canceled}`. The
//! cancel/fire race is decided by a single atomic claim: whichever side wins
//! the compare-exchange owns the terminal state, so a send is never
//! delivered twice and cancellation after the claim is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::announcement::Announcement;
use crate::destination::{Destination, SentMessageHandle};
use crate::error::TransportError;
use crate::message::Message;
use crate::predicate::Predicate;

/// Unique identifier for a scheduled send.
pub type ScheduleId = Uuid;

/// The live binding of an announcement, a destination, and zero or more
/// predicates, waiting on its timer.
///
/// Owned by the scheduler for its lifetime and dropped once it reaches a
/// terminal state. [`Predicate::Custom`](crate::Predicate::Custom) checks
/// receive a reference to inspect it.
pub struct ScheduledSend {
    id: ScheduleId,
    announcement: Announcement,
    message: Message,
    destination: Arc<dyn Destination>,
    predicates: Vec<Predicate>,
    registered_at: DateTime<Utc>,
}

impl ScheduledSend {
    pub(crate) fn new(
        id: ScheduleId,
        announcement: Announcement,
        message: Message,
        destination: Arc<dyn Destination>,
        predicates: Vec<Predicate>,
    ) -> Self {
        Self {
            id,
            announcement,
            message,
            destination,
            predicates,
            registered_at: Utc::now(),
        }
    }

    /// Identifier of this schedule.
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    /// The announcement this send was built from.
    pub fn announcement(&self) -> &Announcement {
        &self.announcement
    }

    /// The message that will be delivered if the send fires successfully.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The destination this send is bound to.
    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    /// The gating predicates, in evaluation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// When this send was registered.
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl std::fmt::Debug for ScheduledSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledSend")
            .field("id", &self.id)
            .field("predicates", &self.predicates)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Terminal result of one scheduled send, reported once through its
/// [`CancelHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// All predicates passed and the destination accepted the message.
    Delivered(SentMessageHandle),
    /// A predicate failed (or errored) at fire-time; nothing was sent.
    Skipped,
    /// The schedule was canceled before delivery began.
    Canceled,
    /// Predicates passed but the destination rejected the delivery.
    Failed(TransportError),
}

/// State shared between a schedule's timer task and its handle.
///
/// `claimed` is the terminal-state claim: the timer task claims it after its
/// sleep completes, [`CancelHandle::cancel`] claims it to cancel. Exactly one
/// side wins.
struct ScheduleShared {
    claimed: AtomicBool,
    cancel: CancellationToken,
}

/// Handle returned at schedule time, used to cancel the send or observe its
/// outcome.
///
/// The handle does not keep the scheduled send alive; once the send reaches
/// a terminal state, canceling is a safe no-op.
#[derive(Debug)]
pub struct CancelHandle {
    id: ScheduleId,
    shared: Arc<ScheduleShared>,
    outcome: oneshot::Receiver<FireOutcome>,
}

impl std::fmt::Debug for ScheduleShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleShared")
            .field("claimed", &self.claimed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CancelHandle {
    /// Identifier of the schedule this handle controls.
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    /// Cancel the scheduled send.
    ///
    /// Returns `true` if this call prevented delivery: the timer had not yet
    /// claimed its fire, and no delivery will begin after this returns.
    /// Returns `false` if the send already fired (delivered or skipped) or
    /// was already canceled. In that case this call changes nothing.
    pub fn cancel(&self) -> bool {
        if self
            .shared
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.shared.cancel.cancel();
            true
        } else {
            // Lost the claim: the timer already began firing, or cancel was
            // already called. The winner owns the terminal state.
            false
        }
    }

    /// Wait for the schedule to reach its terminal state and return it.
    ///
    /// Reports [`FireOutcome::Canceled`] if the scheduler was shut down
    /// before the send could fire.
    pub async fn outcome(self) -> FireOutcome {
        self.outcome.await.unwrap_or(FireOutcome::Canceled)
    }
}

/// Internal bookkeeping for one pending schedule.
struct ScheduleEntry {
    shared: Arc<ScheduleShared>,
    task: JoinHandle<()>,
}

/// Shared timer service multiplexing many independent delayed sends.
///
/// Creating a scheduler is cheap and synchronous; it spawns no tasks until
/// something is scheduled. Cloning shares the same schedule table.
#[derive(Clone)]
pub struct Scheduler {
    schedules: Arc<RwLock<HashMap<ScheduleId, ScheduleEntry>>>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of schedules still pending (not yet fired or canceled).
    pub async fn schedule_count(&self) -> usize {
        self.schedules.read().await.len()
    }

    /// Register a scheduled send. Called by
    /// [`Announcement::schedule`](crate::Announcement::schedule) with an
    /// already-validated message.
    pub(crate) async fn register(
        &self,
        announcement: Announcement,
        message: Message,
        destination: Arc<dyn Destination>,
        delay: Duration,
        predicates: Vec<Predicate>,
    ) -> CancelHandle {
        let id = ScheduleId::new_v4();
        let shared = Arc::new(ScheduleShared {
            claimed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let send = ScheduledSend::new(id, announcement, message, destination, predicates);
        debug!(
            schedule = %id,
            delay_ms = delay.as_millis() as u64,
            predicates = send.predicates().len(),
            "registered scheduled send"
        );

        let task_shared = Arc::clone(&shared);
        let schedules = Arc::clone(&self.schedules);

        // Hold the table lock across the spawn so the task cannot observe
        // (and try to remove) a not-yet-inserted entry, even with zero delay.
        let mut table = self.schedules.write().await;
        let task = tokio::spawn(async move {
            let outcome = run_schedule(&send, &task_shared, delay).await;
            // Drop the bookkeeping entry before reporting the outcome, so an
            // observer that sees the outcome also sees the schedule gone.
            schedules.write().await.remove(&id);
            let _ = outcome_tx.send(outcome);
        });
        table.insert(
            id,
            ScheduleEntry {
                shared: Arc::clone(&shared),
                task,
            },
        );
        drop(table);

        CancelHandle {
            id,
            shared,
            outcome: outcome_rx,
        }
    }

    /// Cancel every pending schedule and wait for their tasks to finish.
    ///
    /// Sends whose timers have already claimed their fire complete normally;
    /// everything still waiting is canceled.
    pub async fn shutdown(&self) {
        let entries: Vec<(ScheduleId, ScheduleEntry)> =
            self.schedules.write().await.drain().collect();
        if entries.is_empty() {
            return;
        }
        info!(pending = entries.len(), "shutting down scheduler");

        for (id, entry) in entries {
            if entry
                .shared
                .claimed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                debug!(schedule = %id, "canceled pending send during shutdown");
            }
            entry.shared.cancel.cancel();
            if let Err(join_error) = entry.task.await {
                warn!(schedule = %id, %join_error, "schedule task died during shutdown");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// Sleep out the delay, then evaluate predicates and deliver.
///
/// Runs entirely on the schedule's own task. Predicate errors are absorbed
/// here: they downgrade to a failed check and the send is skipped. Delivery
/// errors are reported through the returned outcome, never retried.
async fn run_schedule(
    send: &ScheduledSend,
    shared: &ScheduleShared,
    delay: Duration,
) -> FireOutcome {
    tokio::select! {
        () = shared.cancel.cancelled() => {
            info!(schedule = %send.id(), "scheduled send canceled");
            return FireOutcome::Canceled;
        }
        () = tokio::time::sleep(delay) => {}
    }

    // Claim the terminal state. Losing means a concurrent cancel won after
    // the timer expired but before delivery began.
    if shared
        .claimed
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        info!(schedule = %send.id(), "scheduled send canceled at fire-time");
        return FireOutcome::Canceled;
    }

    for predicate in send.predicates() {
        match predicate.check(send).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    schedule = %send.id(),
                    predicate = predicate.name(),
                    "gating predicate failed, skipping announcement"
                );
                return FireOutcome::Skipped;
            }
            Err(check_error) => {
                warn!(
                    schedule = %send.id(),
                    predicate = predicate.name(),
                    %check_error,
                    "predicate evaluation failed, skipping announcement"
                );
                return FireOutcome::Skipped;
            }
        }
    }

    match send.destination().send(send.message()).await {
        Ok(sent) => {
            debug!(schedule = %send.id(), message_id = %sent.message_id, "scheduled send delivered");
            FireOutcome::Delivered(sent)
        }
        Err(transport_error) => {
            error!(
                schedule = %send.id(),
                %transport_error,
                "scheduled send failed to deliver"
            );
            FireOutcome::Failed(transport_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{snapshot, TestDestination};
    use crate::Announcement;
    use std::sync::atomic::AtomicUsize;

    fn announcement() -> Announcement {
        Announcement::with_content("scheduled hello")
    }

    #[tokio::test(start_paused = true)]
    async fn zero_predicates_delivers_exactly_once() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(50),
            )
            .await
            .unwrap();

        assert!(matches!(handle.outcome().await, FireOutcome::Delivered(_)));
        assert_eq!(destination.sent().len(), 1);
        assert_eq!(scheduler.schedule_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_delivers() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::ZERO,
            )
            .await
            .unwrap();

        assert!(matches!(handle.outcome().await, FireOutcome::Delivered(_)));
        assert_eq!(destination.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_predicate_skips_delivery() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .schedule(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(20),
                vec![Predicate::custom(|_| false)],
            )
            .await
            .unwrap();

        assert_eq!(handle.outcome().await, FireOutcome::Skipped);
        assert!(destination.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_prevents_delivery() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(handle.cancel());
        assert_eq!(handle.outcome().await, FireOutcome::Canceled);

        // Wait well past the original fire time; nothing may arrive.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(destination.sent().is_empty());
        assert_eq!(scheduler.schedule_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_a_noop() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(1),
            )
            .await
            .unwrap();

        // Let the timer fire and the delivery complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;

        assert!(!handle.cancel());
        assert_eq!(destination.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_cancel_claims_only_once() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.outcome().await, FireOutcome::Canceled);
        assert!(destination.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_race_resolves_to_exactly_one_terminal_state() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::ZERO,
            )
            .await
            .unwrap();

        let prevented = handle.cancel();
        let outcome = handle.outcome().await;

        if prevented {
            assert_eq!(outcome, FireOutcome::Canceled);
            assert!(destination.sent().is_empty());
        } else {
            assert!(matches!(outcome, FireOutcome::Delivered(_)));
            assert_eq!(destination.sent().len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_transport_error_is_absorbed_as_skip() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());
        destination.fail_history(true);

        let handle = announcement()
            .schedule(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(5),
                vec![Predicate::NotEmpty],
            )
            .await
            .unwrap();

        assert_eq!(handle.outcome().await, FireOutcome::Skipped);
        assert!(destination.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_failure_is_reported_once_and_not_retried() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());
        destination.fail_send(true);

        let handle = announcement()
            .send_after(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(5),
            )
            .await
            .unwrap();

        assert!(matches!(handle.outcome().await, FireOutcome::Failed(_)));
        assert_eq!(destination.send_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_predicate_short_circuits_later_ones() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());
        let evaluated = Arc::new(AtomicUsize::new(0));
        let evaluated_in_predicate = Arc::clone(&evaluated);

        // NotEmpty fails on the empty destination before the counter runs.
        let handle = announcement()
            .schedule(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(5),
                vec![
                    Predicate::NotEmpty,
                    Predicate::custom(move |_| {
                        evaluated_in_predicate.fetch_add(1, Ordering::SeqCst);
                        true
                    }),
                ],
            )
            .await
            .unwrap();

        assert_eq!(handle.outcome().await, FireOutcome::Skipped);
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn all_predicates_passing_delivers() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::with_history(vec![snapshot(
            42,
            Duration::from_secs(120),
            false,
        )]));

        let handle = announcement()
            .schedule(
                &scheduler,
                Arc::clone(&destination) as Arc<dyn Destination>,
                Duration::from_millis(5),
                vec![
                    Predicate::NotEmpty,
                    Predicate::NoImageInLast(3),
                    Predicate::Active(Duration::from_secs(300)),
                ],
            )
            .await
            .unwrap();

        assert!(matches!(handle.outcome().await, FireOutcome::Delivered(_)));
        assert_eq!(destination.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything_pending() {
        let scheduler = Scheduler::new();
        let destination = Arc::new(TestDestination::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(
                announcement()
                    .send_after(
                        &scheduler,
                        Arc::clone(&destination) as Arc<dyn Destination>,
                        Duration::from_secs(60),
                    )
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(scheduler.schedule_count().await, 4);

        scheduler.shutdown().await;
        assert_eq!(scheduler.schedule_count().await, 0);
        for handle in handles {
            assert_eq!(handle.outcome().await, FireOutcome::Canceled);
        }
        assert!(destination.sent().is_empty());
    }
}
