//! Job subscriptions: push registry, event gate, and the watch/poll streams

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{trace, warn};

use super::job::{JobStatus, JobView};
use super::manager::JobManager;

/// What a subscriber sees
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Status or progress changed
    Update(JobView),
    /// The job reached a terminal state; last event of a stream
    Complete(JobView),
    /// Keep-alive while nothing changes
    Heartbeat,
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Update(_) => "job:update",
            JobEvent::Complete(_) => "job:complete",
            JobEvent::Heartbeat => "ping",
        }
    }

    pub fn view(&self) -> Option<&JobView> {
        match self {
            JobEvent::Update(view) | JobEvent::Complete(view) => Some(view),
            JobEvent::Heartbeat => None,
        }
    }

    /// Server-sent-events frame: `event: <name>\ndata: <json>\n\n`
    pub fn to_sse(&self) -> String {
        let data = match self.view() {
            Some(view) => serde_json::to_string(view).unwrap_or_else(|_| "{}".to_string()),
            None => "{}".to_string(),
        };
        format!("event: {}\ndata: {}\n\n", self.name(), data)
    }
}

// ============================================================================
// Push registry
// ============================================================================

type Senders = HashMap<u64, UnboundedSender<JobView>>;

/// Per-job subscriber lists
#[derive(Debug, Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Senders>>,
}

impl SubscriberRegistry {
    pub(crate) fn subscribe(self: &Arc<Self>, job_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .insert(id, tx);
        Subscription {
            job_id: job_id.to_string(),
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Deliver a snapshot to every live subscriber of the job
    pub(crate) fn notify(&self, view: &JobView) {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(&view.id) else {
            return;
        };
        senders.retain(|_, tx| tx.send(view.clone()).is_ok());
        if senders.is_empty() {
            subscribers.remove(&view.id);
        }
    }

    pub(crate) fn count(&self, job_id: &str) -> usize {
        self.subscribers.lock().get(job_id).map_or(0, HashMap::len)
    }

    fn unsubscribe(&self, job_id: &str, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(job_id) {
            senders.remove(&id);
            if senders.is_empty() {
                subscribers.remove(job_id);
            }
        }
    }
}

/// Receives every state change of one job. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    job_id: String,
    id: u64,
    rx: UnboundedReceiver<JobView>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn recv(&mut self) -> Option<JobView> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JobView> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.job_id, self.id);
    }
}

// ============================================================================
// Event gate
// ============================================================================

/// Turns a sequence of snapshots into events: drops repeats and stale
/// snapshots, and closes after the terminal one.
#[derive(Debug, Default)]
pub struct EventGate {
    last: Option<(JobStatus, u8)>,
    finished: bool,
}

impl EventGate {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, view: JobView, out: &mut VecDeque<JobEvent>) {
        if self.finished {
            return;
        }
        let key = (view.status, view.progress);
        if let Some((status, progress)) = self.last {
            if key == (status, progress) {
                return;
            }
            let stale = view.status.rank() < status.rank()
                || (view.status == status && view.progress < progress);
            if stale {
                trace!(job = %view.id, "dropping stale snapshot");
                return;
            }
        }
        self.last = Some(key);
        if view.is_terminal() {
            self.finished = true;
            out.push_back(JobEvent::Update(view.clone()));
            out.push_back(JobEvent::Complete(view));
        } else {
            out.push_back(JobEvent::Update(view));
        }
    }
}

// ============================================================================
// Streams
// ============================================================================

enum Source {
    Push(Subscription),
    Poll {
        manager: JobManager,
        job_id: String,
        ticker: Interval,
    },
}

enum Step {
    Snapshot(JobView),
    Tick,
    Heartbeat,
    Closed,
}

/// Event stream for one job, backed by push notifications or by polling.
///
/// Both sources go through the same [`EventGate`], so a consumer sees the
/// same events whichever one it uses.
pub struct JobStream {
    source: Source,
    gate: EventGate,
    queue: VecDeque<JobEvent>,
    heartbeat: Interval,
}

fn heartbeat_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl JobStream {
    pub(crate) fn push(subscription: Subscription, initial: JobView, heartbeat: Duration) -> Self {
        let mut stream = Self {
            source: Source::Push(subscription),
            gate: EventGate::default(),
            queue: VecDeque::new(),
            heartbeat: heartbeat_interval(heartbeat),
        };
        stream.gate.feed(initial, &mut stream.queue);
        stream
    }

    pub(crate) fn poll(manager: JobManager, job_id: String, every: Duration, heartbeat: Duration) -> Self {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            source: Source::Poll {
                manager,
                job_id,
                ticker,
            },
            gate: EventGate::default(),
            queue: VecDeque::new(),
            heartbeat: heartbeat_interval(heartbeat),
        }
    }

    /// Next event, or `None` once the job is terminal or the source is gone
    pub async fn next(&mut self) -> Option<JobEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            if self.gate.is_finished() {
                return None;
            }

            let step = match &mut self.source {
                Source::Push(subscription) => tokio::select! {
                    view = subscription.recv() => view.map_or(Step::Closed, Step::Snapshot),
                    _ = self.heartbeat.tick() => Step::Heartbeat,
                },
                Source::Poll { ticker, .. } => tokio::select! {
                    _ = ticker.tick() => Step::Tick,
                    _ = self.heartbeat.tick() => Step::Heartbeat,
                },
            };

            match step {
                Step::Snapshot(view) => self.gate.feed(view, &mut self.queue),
                Step::Heartbeat => return Some(JobEvent::Heartbeat),
                Step::Closed => return None,
                Step::Tick => {
                    if let Source::Poll { manager, job_id, .. } = &self.source {
                        match manager.get_job(job_id).await {
                            Ok(Some(job)) => self.gate.feed(job.view(), &mut self.queue),
                            Ok(None) => {}
                            Err(err) => warn!(job = %job_id, "poll failed: {}", err),
                        }
                    }
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = JobEvent> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Job;

    fn view(status: JobStatus, progress: u8) -> JobView {
        let mut job = Job::new("p1", None);
        job.id = "job-1".into();
        job.status = status;
        job.progress = progress;
        job.view()
    }

    #[test]
    fn test_sse_encoding() {
        let event = JobEvent::Update(view(JobStatus::Running, 15));
        let frame = event.to_sse();
        assert!(frame.starts_with("event: job:update\ndata: {"));
        assert!(frame.contains("\"progress\":15"));
        assert!(frame.ends_with("\n\n"));
        assert_eq!(JobEvent::Heartbeat.to_sse(), "event: ping\ndata: {}\n\n");
    }

    #[test]
    fn test_gate_dedupes_and_finishes() {
        let mut gate = EventGate::default();
        let mut out = VecDeque::new();
        gate.feed(view(JobStatus::Running, 2), &mut out);
        gate.feed(view(JobStatus::Running, 2), &mut out);
        gate.feed(view(JobStatus::Running, 15), &mut out);
        gate.feed(view(JobStatus::Running, 10), &mut out);
        gate.feed(view(JobStatus::Done, 100), &mut out);
        gate.feed(view(JobStatus::Done, 100), &mut out);

        let names: Vec<&str> = out.iter().map(JobEvent::name).collect();
        assert_eq!(
            names,
            vec!["job:update", "job:update", "job:update", "job:complete"]
        );
        assert!(gate.is_finished());
    }

    #[test]
    fn test_gate_drops_status_regression() {
        let mut gate = EventGate::default();
        let mut out = VecDeque::new();
        gate.feed(view(JobStatus::Running, 27), &mut out);
        gate.feed(view(JobStatus::Queued, 0), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_registry_unsubscribes_on_drop() {
        let registry = Arc::new(SubscriberRegistry::default());
        let mut first = registry.subscribe("job-1");
        let second = registry.subscribe("job-1");
        assert_eq!(registry.count("job-1"), 2);

        registry.notify(&view(JobStatus::Running, 2));
        assert_eq!(first.try_recv().map(|v| v.progress), Some(2));

        drop(second);
        assert_eq!(registry.count("job-1"), 1);
        drop(first);
        assert_eq!(registry.count("job-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_stream_heartbeats_then_completes() {
        let registry = Arc::new(SubscriberRegistry::default());
        let subscription = registry.subscribe("job-1");
        let mut stream = JobStream::push(
            subscription,
            view(JobStatus::Queued, 0),
            Duration::from_secs(15),
        );

        assert_eq!(stream.next().await.map(|e| e.name()), Some("job:update"));
        assert_eq!(stream.next().await, Some(JobEvent::Heartbeat));

        registry.notify(&view(JobStatus::Error, 0));
        assert_eq!(stream.next().await.map(|e| e.name()), Some("job:update"));
        assert_eq!(stream.next().await.map(|e| e.name()), Some("job:complete"));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_complete() {
        use futures_util::StreamExt;

        let registry = Arc::new(SubscriberRegistry::default());
        let stream = JobStream::push(
            registry.subscribe("job-1"),
            view(JobStatus::Done, 100),
            Duration::from_secs(15),
        );
        let names: Vec<&str> = stream.into_stream().map(|e| e.name()).collect().await;
        assert_eq!(names, vec!["job:update", "job:complete"]);
        assert_eq!(registry.count("job-1"), 0);
    }
}
