//! One check/download/ready cycle per launch, raced against a timeout.
//!
//! The update source reports through a single `UpdateEvent` channel. The event
//! loop and the timeout share one `CompletionGuard`. Whichever resolves first
//! decides the outcome, and anything arriving afterwards is logged and dropped.

pub mod http_source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::UpdateError;
use crate::progress::UPDATE_RANGE;
use crate::types::{DownloadProgress, UpdateCheckOutcome, UpdateState, UpdateStatus};

pub use http_source::HttpUpdateSource;

/// Lifecycle events emitted by an update source.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    Checking,
    Available { version: String },
    Downloading(DownloadProgress),
    Downloaded { version: String },
    NotAvailable,
    Error(String),
}

#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Checks for and downloads an update, reporting every step on `events`.
    async fn check(&self, events: mpsc::UnboundedSender<UpdateEvent>);

    /// Hands the downloaded update to the installer, which relaunches the app.
    fn install(&self) -> Result<(), UpdateError>;
}

/// Splash-facing view of one update event.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProgress {
    pub percent: u8,
    pub label: String,
    pub download: Option<DownloadProgress>,
}

/// First-writer-wins resolution shared by competing paths.
pub struct CompletionGuard<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionGuard<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn sender(&self) -> MutexGuard<'_, Option<oneshot::Sender<T>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_resolved(&self) -> bool {
        self.sender().is_none()
    }

    /// Runs `f` only while unresolved. Holds the guard so `resolve` cannot interleave.
    pub fn while_pending<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let sender = self.sender();
        if sender.is_none() {
            return None;
        }
        Some(f())
    }

    /// Resolves with `value` if nobody did yet; `commit` runs first, under the guard.
    pub fn resolve(&self, value: T, commit: impl FnOnce(&T)) -> bool {
        let mut sender = self.sender();
        let Some(tx) = sender.take() else {
            return false;
        };
        commit(&value);
        // The receiver may be gone; the resolution still counts.
        let _ = tx.send(value);
        true
    }
}

pub struct UpdateCoordinator {
    source: Option<Arc<dyn UpdateSource>>,
    packaged: bool,
    timeout: Duration,
    state: Arc<Mutex<UpdateState>>,
    pending: Arc<Mutex<Option<String>>>,
    announced: AtomicBool,
    installing: AtomicBool,
}

impl UpdateCoordinator {
    pub fn new(source: Option<Arc<dyn UpdateSource>>, packaged: bool, timeout: Duration) -> Self {
        Self {
            source,
            packaged,
            timeout,
            state: Arc::new(Mutex::new(UpdateState::Idle)),
            pending: Arc::new(Mutex::new(None)),
            announced: AtomicBool::new(false),
            installing: AtomicBool::new(false),
        }
    }

    /// Runs the update cycle; the returned outcome is decided exactly once.
    pub async fn run<F>(&self, on_progress: F) -> UpdateCheckOutcome
    where
        F: Fn(UpdateProgress) + Send + Sync + 'static,
    {
        if !self.packaged {
            info!("development build, update check skipped");
            return UpdateCheckOutcome::none();
        }
        let Some(source) = self.source.clone() else {
            info!("no update source available, update check skipped");
            return UpdateCheckOutcome::none();
        };

        let (guard, resolved) = CompletionGuard::new();
        let guard = Arc::new(guard);
        let on_progress = Arc::new(on_progress);
        let (tx, rx) = mpsc::unbounded_channel();

        let check = tokio::spawn(async move {
            source.check(tx).await;
        });

        let timer = {
            let guard = Arc::clone(&guard);
            let state = Arc::clone(&self.state);
            let on_progress = Arc::clone(&on_progress);
            let timeout = self.timeout;
            tokio::spawn(async move {
                sleep(timeout).await;
                let won = guard.resolve(UpdateCheckOutcome::none(), |_| {
                    *lock(&state) = UpdateState::Errored {
                        message: format!("update check timed out after {:?}", timeout),
                    };
                    on_progress(UpdateProgress {
                        percent: UPDATE_RANGE.end,
                        label: "Update check timed out".to_string(),
                        download: None,
                    });
                });
                if won {
                    warn!(?timeout, "update check timed out, continuing without update");
                }
            })
        };

        tokio::spawn(consume_events(
            rx,
            guard,
            Arc::clone(&self.state),
            Arc::clone(&self.pending),
            on_progress,
        ));

        let outcome = resolved.await.unwrap_or_else(|_| UpdateCheckOutcome::none());
        timer.abort();
        // A source still downloading after a timeout has nothing left to report to.
        check.abort();
        info!(has_update = outcome.has_update, version = ?outcome.version, "update check resolved");
        outcome
    }

    /// Version downloaded this session, for the main UI's first ready signal only.
    pub fn take_pending(&self) -> Option<String> {
        let pending = lock(&self.pending).clone()?;
        if self.announced.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(pending)
    }

    pub fn pending_version(&self) -> Option<String> {
        lock(&self.pending).clone()
    }

    pub fn status(&self) -> UpdateStatus {
        UpdateStatus {
            state: lock(&self.state).clone(),
            pending_version: self.pending_version(),
        }
    }

    /// Installs the downloaded update. Returns `true` when the app should exit so
    /// the installer can relaunch it; every other case is a silent no-op.
    pub fn install(&self) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        if !self.packaged || lock(&self.pending).is_none() {
            debug!("no downloaded update to install");
            return false;
        }
        if self.installing.swap(true, Ordering::SeqCst) {
            return false;
        }
        match source.install() {
            Ok(()) => {
                let version = lock(&self.pending).take();
                info!(?version, "installing update and relaunching");
                true
            }
            Err(e) => {
                warn!("update install failed: {}", e);
                self.installing.store(false, Ordering::SeqCst);
                false
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn consume_events<F>(
    mut rx: mpsc::UnboundedReceiver<UpdateEvent>,
    guard: Arc<CompletionGuard<UpdateCheckOutcome>>,
    state: Arc<Mutex<UpdateState>>,
    pending: Arc<Mutex<Option<String>>>,
    on_progress: Arc<F>,
) where
    F: Fn(UpdateProgress) + Send + Sync + 'static,
{
    while let Some(event) = rx.recv().await {
        let (next, progress) = describe(&event);

        if !next.is_terminal() {
            let applied = guard.while_pending(|| {
                *lock(&state) = next;
                on_progress(progress);
            });
            if applied.is_none() {
                debug!(?event, "update event after resolution ignored");
            }
            continue;
        }

        let outcome = match &event {
            UpdateEvent::Downloaded { version } => UpdateCheckOutcome::ready(version.clone()),
            _ => UpdateCheckOutcome::none(),
        };
        let won = guard.resolve(outcome, |outcome| {
            if let Some(version) = &outcome.version {
                *lock(&pending) = Some(version.clone());
            }
            *lock(&state) = next;
            on_progress(progress);
        });
        if won {
            match &event {
                UpdateEvent::Error(message) => warn!("update check failed: {}", message),
                _ => info!(?event, "update check finished"),
            }
        } else {
            debug!(?event, "terminal update event after resolution ignored");
        }
    }
}

/// State and splash progress for one event, inside the update sub-range.
fn describe(event: &UpdateEvent) -> (UpdateState, UpdateProgress) {
    let step = |percent: u8, label: String, download: Option<DownloadProgress>| UpdateProgress {
        percent,
        label,
        download,
    };
    match event {
        UpdateEvent::Checking => (
            UpdateState::Checking,
            step(UPDATE_RANGE.start, "Checking for updates...".into(), None),
        ),
        UpdateEvent::Available { version } => (
            UpdateState::Available {
                version: version.clone(),
            },
            step(50, format!("Update {} available", version), None),
        ),
        UpdateEvent::Downloading(d) => {
            let percent = 50 + (d.percent.clamp(0.0, 100.0) * 0.40).round() as u8;
            (
                UpdateState::Downloading(*d),
                step(
                    percent,
                    format!("Downloading update... {:.0}%", d.percent),
                    Some(*d),
                ),
            )
        }
        UpdateEvent::Downloaded { version } => (
            UpdateState::Downloaded {
                version: version.clone(),
            },
            step(UPDATE_RANGE.end, format!("Update {} ready", version), None),
        ),
        UpdateEvent::NotAvailable => (
            UpdateState::NotAvailable,
            step(UPDATE_RANGE.end, "Up to date".into(), None),
        ),
        UpdateEvent::Error(message) => (
            UpdateState::Errored {
                message: message.clone(),
            },
            step(UPDATE_RANGE.end, "Update check failed".into(), None),
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Plays back `(delay, event)` pairs.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pub script: Vec<(Duration, UpdateEvent)>,
        pub checks: AtomicU32,
        pub installs: AtomicU32,
        pub completed: AtomicU32,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<(Duration, UpdateEvent)>) -> Self {
            Self {
                script,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn check(&self, events: mpsc::UnboundedSender<UpdateEvent>) {
            self.checks.fetch_add(1, Ordering::SeqCst);
            for (delay, event) in &self.script {
                sleep(*delay).await;
                if events.send(event.clone()).is_err() {
                    return;
                }
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn install(&self) -> Result<(), UpdateError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn download(percent: f64) -> UpdateEvent {
        UpdateEvent::Downloading(DownloadProgress {
            percent,
            transferred: (percent * 10.0) as u64,
            total: 1000,
            speed: 2048.0,
        })
    }

    fn recorder() -> (Arc<Mutex<Vec<UpdateProgress>>>, impl Fn(UpdateProgress) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p| sink.lock().unwrap().push(p))
    }

    fn coordinator(source: &Arc<ScriptedSource>, timeout: Duration) -> UpdateCoordinator {
        let source: Arc<dyn UpdateSource> = source.clone();
        UpdateCoordinator::new(Some(source), true, timeout)
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn guard_resolves_once_across_threads() {
        for _ in 0..50 {
            let (guard, mut rx) = CompletionGuard::<u32>::new();
            let guard = Arc::new(guard);
            let wins = Arc::new(AtomicU32::new(0));
            let threads: Vec<_> = (0..8)
                .map(|i| {
                    let guard = Arc::clone(&guard);
                    let wins = Arc::clone(&wins);
                    std::thread::spawn(move || {
                        if guard.resolve(i, |_| {}) {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert!(rx.try_recv().is_ok());
            assert!(guard.is_resolved());
            assert!(guard.while_pending(|| ()).is_none());
        }
    }

    #[tokio::test]
    async fn development_build_skips_the_source() {
        let source = Arc::new(ScriptedSource::new(vec![(MS, UpdateEvent::NotAvailable)]));
        let dyn_source: Arc<dyn UpdateSource> = source.clone();
        let coordinator = UpdateCoordinator::new(Some(dyn_source), false, Duration::from_secs(30));

        let outcome = coordinator.run(|_| {}).await;

        assert_eq!(outcome, UpdateCheckOutcome::none());
        assert_eq!(source.checks.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.status().state, UpdateState::Idle);
    }

    #[tokio::test]
    async fn missing_source_resolves_immediately() {
        let coordinator = UpdateCoordinator::new(None, true, Duration::from_secs(30));
        assert_eq!(coordinator.run(|_| {}).await, UpdateCheckOutcome::none());
        assert!(!coordinator.install());
    }

    #[tokio::test(start_paused = true)]
    async fn downloaded_update_becomes_pending_and_is_announced_once() {
        let source = Arc::new(ScriptedSource::new(vec![
            (MS, UpdateEvent::Checking),
            (MS, UpdateEvent::Available { version: "1.2.3".into() }),
            (MS, download(25.0)),
            (MS, download(100.0)),
            (MS, UpdateEvent::Downloaded { version: "1.2.3".into() }),
        ]));
        let coordinator = coordinator(&source, Duration::from_secs(30));
        let (seen, on_progress) = recorder();

        let outcome = coordinator.run(on_progress).await;

        assert_eq!(outcome, UpdateCheckOutcome::ready("1.2.3"));
        assert_eq!(coordinator.pending_version().as_deref(), Some("1.2.3"));
        assert_eq!(
            coordinator.status().state,
            UpdateState::Downloaded { version: "1.2.3".into() }
        );

        let percents: Vec<u8> = seen.lock().unwrap().iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![45, 50, 60, 90, 92]);
        assert!(seen.lock().unwrap()[2].download.is_some());
        assert!(seen.lock().unwrap()[4].download.is_none());

        assert_eq!(coordinator.take_pending().as_deref(), Some("1.2.3"));
        assert_eq!(coordinator.take_pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn not_available_resolves_without_update() {
        let source = Arc::new(ScriptedSource::new(vec![
            (MS, UpdateEvent::Checking),
            (MS, UpdateEvent::NotAvailable),
        ]));
        let coordinator = coordinator(&source, Duration::from_secs(30));

        assert_eq!(coordinator.run(|_| {}).await, UpdateCheckOutcome::none());
        assert_eq!(coordinator.status().state, UpdateState::NotAvailable);
        assert_eq!(coordinator.take_pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn source_error_resolves_without_update() {
        let source = Arc::new(ScriptedSource::new(vec![
            (MS, UpdateEvent::Checking),
            (MS, UpdateEvent::Error("manifest returned HTTP 500".into())),
        ]));
        let coordinator = coordinator(&source, Duration::from_secs(30));

        assert_eq!(coordinator.run(|_| {}).await, UpdateCheckOutcome::none());
        assert!(matches!(coordinator.status().state, UpdateState::Errored { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_and_late_events_are_discarded() {
        let source = Arc::new(ScriptedSource::new(vec![
            (MS, UpdateEvent::Checking),
            (MS, UpdateEvent::Available { version: "2.0.0".into() }),
            (Duration::from_secs(40), UpdateEvent::Downloaded { version: "2.0.0".into() }),
        ]));
        let coordinator = coordinator(&source, Duration::from_secs(30));
        let (seen, on_progress) = recorder();
        let started = tokio::time::Instant::now();

        let outcome = coordinator.run(on_progress).await;

        assert_eq!(outcome, UpdateCheckOutcome::none());
        assert!(started.elapsed() <= Duration::from_secs(31));
        let timed_out = coordinator.status().state;
        assert!(matches!(&timed_out, UpdateState::Errored { message } if message.contains("timed out")));

        // Let the late Downloaded event arrive.
        sleep(Duration::from_secs(20)).await;
        assert_eq!(coordinator.status().state, timed_out);
        assert_eq!(coordinator.pending_version(), None);
        let labels: Vec<String> = seen.lock().unwrap().iter().map(|p| p.label.clone()).collect();
        assert_eq!(labels.last().map(String::as_str), Some("Update check timed out"));
        assert!(!labels.iter().any(|l| l.contains("ready")));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_the_running_check() {
        let source = Arc::new(ScriptedSource::new(vec![
            (MS, UpdateEvent::Available { version: "2.0.0".into() }),
            (Duration::from_secs(10), download(10.0)),
            (Duration::from_secs(60), UpdateEvent::Downloaded { version: "2.0.0".into() }),
        ]));
        let coordinator = coordinator(&source, Duration::from_secs(30));
        let (seen, on_progress) = recorder();

        assert_eq!(coordinator.run(on_progress).await, UpdateCheckOutcome::none());
        let reported = seen.lock().unwrap().len();

        sleep(Duration::from_secs(120)).await;
        assert_eq!(source.checks.load(Ordering::SeqCst), 1);
        assert_eq!(source.completed.load(Ordering::SeqCst), 0);
        assert_eq!(seen.lock().unwrap().len(), reported);
        assert_eq!(coordinator.pending_version(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_event_and_timeout_racing_resolve_once() {
        for offset_ms in [0u64, 1, 5, 10] {
            let first = Duration::from_millis(100 - offset_ms.min(100));
            let source = Arc::new(ScriptedSource::new(vec![
                (first, UpdateEvent::Downloaded { version: "1.2.3".into() }),
                (Duration::from_millis(2 * offset_ms), UpdateEvent::NotAvailable),
            ]));
            let coordinator = coordinator(&source, Duration::from_millis(100));
            let (seen, on_progress) = recorder();

            let outcome = coordinator.run(on_progress).await;
            sleep(Duration::from_millis(50)).await;

            let terminal_reports = seen
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.percent == UPDATE_RANGE.end)
                .count();
            assert_eq!(terminal_reports, 1, "offset {}ms", offset_ms);

            let state = coordinator.status().state;
            if outcome.has_update {
                assert_eq!(state, UpdateState::Downloaded { version: "1.2.3".into() });
                assert_eq!(coordinator.pending_version().as_deref(), Some("1.2.3"));
            } else {
                assert!(matches!(state, UpdateState::Errored { .. }));
                assert_eq!(coordinator.pending_version(), None);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn install_is_idempotent_and_needs_a_download() {
        let source = Arc::new(ScriptedSource::new(vec![(
            MS,
            UpdateEvent::Downloaded { version: "1.2.3".into() },
        )]));
        let coordinator = coordinator(&source, Duration::from_secs(30));

        assert!(!coordinator.install());
        assert_eq!(source.installs.load(Ordering::SeqCst), 0);

        coordinator.run(|_| {}).await;
        assert!(coordinator.install());
        assert!(!coordinator.install());
        assert_eq!(source.installs.load(Ordering::SeqCst), 1);
    }
}
