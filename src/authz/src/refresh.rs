//! Background refresh of the rule and credential snapshots
//!
//! One task per snapshot kind. Each cycle reads the full table from the
//! [`AclSource`], compiles it off to the side and publishes it into the
//! [`RuleStore`]. A failed cycle is logged and leaves the current snapshot in
//! place; the next cycle runs after the usual delay.

use crate::error::Result;
use crate::pattern::CaseSensitivity;
use crate::rule::{AclRule, CredentialRecord};
use crate::source::AclSource;
use crate::store::RuleStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop` waits for a task to observe cancellation before aborting it
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Refresh scheduling settings
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Delay between the end of one rule cycle and the start of the next
    pub rule_interval: Duration,

    /// Delay between credential cycles; `None` disables credential refresh
    pub credential_interval: Option<Duration>,

    /// Case policy baked into compiled patterns
    pub case: CaseSensitivity,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            rule_interval: Duration::from_secs(60),
            credential_interval: None,
            case: CaseSensitivity::Sensitive,
        }
    }
}

/// Which snapshot a refresh task maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Rules,
    Credentials,
}

impl SnapshotKind {
    fn name(&self) -> &'static str {
        match self {
            SnapshotKind::Rules => "rules",
            SnapshotKind::Credentials => "credentials",
        }
    }
}

/// Counters for one refresh task
#[derive(Debug, Default)]
struct CycleCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl CycleCounters {
    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        *self.last_success.lock() = Some(Utc::now());
        *self.last_error.lock() = None;
    }

    fn record_failure(&self, error: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error);
    }

    fn snapshot(&self) -> CycleStats {
        CycleStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_success: *self.last_success.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Point-in-time refresh counters for one snapshot kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub succeeded: u64,
    pub failed: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Point-in-time refresh counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub rules: CycleStats,
    pub credentials: CycleStats,
}

/// Shared between the scheduler handle and its tasks
struct Refresher {
    source: Arc<dyn AclSource>,
    store: Arc<RuleStore>,
    case: CaseSensitivity,
    rules: CycleCounters,
    credentials: CycleCounters,
    /// One cycle per kind at a time, so an older fetch never publishes over a newer one
    rules_cycle: AsyncMutex<()>,
    credentials_cycle: AsyncMutex<()>,
}

impl Refresher {
    async fn refresh_rules(&self) -> Result<u64> {
        let rows = self.source.fetch_rules().await?;
        let fetched = rows.len();
        let rules: Vec<AclRule> = rows
            .iter()
            .filter_map(|row| AclRule::compile(row, self.case))
            .collect();

        let count = rules.len();
        let generation = self.store.replace_rules(rules);
        info!(
            "Installed ACL snapshot generation {} ({} rules, {} skipped)",
            generation,
            count,
            fetched - count
        );
        Ok(generation)
    }

    async fn refresh_credentials(&self) -> Result<u64> {
        let rows = self.source.fetch_credentials().await?;
        let records: Vec<CredentialRecord> = rows.into_iter().map(CredentialRecord::from).collect();

        let count = records.len();
        let generation = self.store.replace_credentials(records);
        info!(
            "Installed credential snapshot generation {} ({} users)",
            generation, count
        );
        Ok(generation)
    }

    async fn refresh(&self, kind: SnapshotKind) -> Result<u64> {
        let _cycle = match kind {
            SnapshotKind::Rules => self.rules_cycle.lock().await,
            SnapshotKind::Credentials => self.credentials_cycle.lock().await,
        };

        let result = match kind {
            SnapshotKind::Rules => self.refresh_rules().await,
            SnapshotKind::Credentials => self.refresh_credentials().await,
        };

        let counters = self.counters(kind);
        match &result {
            Ok(_) => counters.record_success(),
            Err(e) => {
                warn!(
                    "Refreshing {} failed, keeping current snapshot: {}",
                    kind.name(),
                    e
                );
                counters.record_failure(e.to_string());
            }
        }
        result
    }

    fn counters(&self, kind: SnapshotKind) -> &CycleCounters {
        match kind {
            SnapshotKind::Rules => &self.rules,
            SnapshotKind::Credentials => &self.credentials,
        }
    }
}

/// Periodic refresher for a [`RuleStore`]
pub struct RefreshScheduler {
    refresher: Arc<Refresher>,
    settings: RefreshSettings,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(source: Arc<dyn AclSource>, store: Arc<RuleStore>, settings: RefreshSettings) -> Self {
        let refresher = Arc::new(Refresher {
            source,
            store,
            case: settings.case,
            rules: CycleCounters::default(),
            credentials: CycleCounters::default(),
            rules_cycle: AsyncMutex::new(()),
            credentials_cycle: AsyncMutex::new(()),
        });

        Self {
            refresher,
            settings,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the refresh tasks. The first cycle of each runs immediately.
    ///
    /// Must be called within a tokio runtime. Returns without waiting for any
    /// cycle; calling it again while running, or after `stop`, does nothing.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() || self.cancel.is_cancelled() {
            debug!("Refresh scheduler already started or stopped");
            return;
        }

        tasks.push(self.spawn(SnapshotKind::Rules, self.settings.rule_interval));
        if let Some(interval) = self.settings.credential_interval {
            tasks.push(self.spawn(SnapshotKind::Credentials, interval));
        }

        info!(
            "Refresh scheduler started (rules every {:?}, credentials {})",
            self.settings.rule_interval,
            match self.settings.credential_interval {
                Some(interval) => format!("every {:?}", interval),
                None => "disabled".to_string(),
            }
        );
    }

    fn spawn(&self, kind: SnapshotKind, interval: Duration) -> JoinHandle<()> {
        let refresher = Arc::clone(&self.refresher);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                debug!("Refreshing {} from source", kind.name());
                if until_cancelled(&cancel, refresher.refresh(kind)).await.is_none() {
                    break;
                }
                if until_cancelled(&cancel, tokio::time::sleep(interval)).await.is_none() {
                    break;
                }
            }
            debug!("Refresh task for {} stopped", kind.name());
        })
    }

    /// Run one rule cycle now, outside the schedule
    pub async fn refresh_rules_now(&self) -> Result<u64> {
        self.refresher.refresh(SnapshotKind::Rules).await
    }

    /// Run one credential cycle now, outside the schedule
    pub async fn refresh_credentials_now(&self) -> Result<u64> {
        self.refresher.refresh(SnapshotKind::Credentials).await
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            rules: self.refresher.rules.snapshot(),
            credentials: self.refresher.credentials.snapshot(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tasks.lock().is_empty()
    }

    /// Cancel pending and in-flight cycles, then close the source.
    ///
    /// An in-flight query is dropped, which hands its connection back. Each
    /// task gets a short grace period before it is aborted. Safe to call more
    /// than once.
    pub async fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let waits = tasks.into_iter().map(|mut task| async move {
            if tokio::time::timeout(STOP_GRACE_PERIOD, &mut task).await.is_err() {
                warn!("Refresh task did not stop in time, aborting");
                task.abort();
            }
        });
        futures::future::join_all(waits).await;

        self.refresher.source.close().await;
        info!("Refresh scheduler stopped");
    }
}

impl Drop for RefreshScheduler {
    // Ends the tasks only; closing the source still needs `stop().await`.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive `future` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::AclRow;
    use crate::source::InMemoryAclSource;

    fn scheduler(source: Arc<InMemoryAclSource>) -> (RefreshScheduler, Arc<RuleStore>) {
        let store = Arc::new(RuleStore::new());
        let scheduler = RefreshScheduler::new(source, Arc::clone(&store), RefreshSettings::default());
        (scheduler, store)
    }

    #[tokio::test]
    async fn test_refresh_now_installs_compiled_rules() {
        let source = Arc::new(InMemoryAclSource::with_rules(vec![
            AclRow::new("alice", "TOPIC", "*", "READ"),
            AclRow::new("bob", "NOT_A_TYPE", "*", "READ"),
        ]));
        let (scheduler, store) = scheduler(source);

        assert_eq!(scheduler.refresh_rules_now().await.unwrap(), 1);
        assert_eq!(store.current_rules().len(), 1);
        assert_eq!(scheduler.stats().rules.succeeded, 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_snapshot() {
        let source = Arc::new(InMemoryAclSource::with_rules(vec![AclRow::new(
            "alice", "TOPIC", "*", "READ",
        )]));
        let (scheduler, store) = scheduler(Arc::clone(&source));
        scheduler.refresh_rules_now().await.unwrap();

        source.fail_with("database down");
        assert!(scheduler.refresh_rules_now().await.is_err());

        let rules = store.current_rules();
        assert_eq!(rules.generation(), 1);
        assert_eq!(rules.len(), 1);

        let stats = scheduler.stats();
        assert_eq!(stats.rules.failed, 1);
        assert!(stats.rules.last_error.unwrap().contains("database down"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (scheduler, _store) = scheduler(Arc::new(InMemoryAclSource::new()));
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // a stopped scheduler cannot be restarted
        scheduler.start();
        assert!(!scheduler.is_running());
    }
}
