//! Integration tests for the scan loop.
//!
//! These tests drive [`Monitor`] with synthetic directory listings and a
//! recording notifier, so debounce timing, turn resolution and staleness
//! checks can be verified without a filesystem or network.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pbem_monitor::config::Config;
use pbem_monitor::directory::{DirEntry, DirectorySource};
use pbem_monitor::error::MonitorError;
use pbem_monitor::notifier::{Notifier, NotifyError};
use pbem_monitor::resolver::{Resolution, TurnResolver, Unresolved};
use pbem_monitor::roster::{Participant, Roster};
use pbem_monitor::scanner::{Monitor, MonitorSettings, INITIAL_TURN};
use pbem_monitor::staleness::StalenessWarning;

// =============================================================================
// Test Helpers
// =============================================================================

/// A notification as seen by the recording notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Turn {
        current: String,
        next: String,
        turn: u32,
    },
    Rename {
        recipient: String,
        filename: String,
        turn: u32,
    },
    Stale {
        filename: String,
        participant: Option<String>,
    },
}

/// Records every notification; optionally fails every send.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, sent: Sent) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(sent);
        if self.fail {
            Err(NotifyError::Status {
                status: 500,
                message: "boom".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_turn_notice(
        &self,
        current: &Participant,
        next: &Participant,
        turn: u32,
    ) -> Result<(), NotifyError> {
        self.record(Sent::Turn {
            current: current.name.clone(),
            next: next.name.clone(),
            turn,
        })
    }

    async fn send_rename_notice(
        &self,
        recipient: &Participant,
        filename: &str,
        turn: u32,
    ) -> Result<(), NotifyError> {
        self.record(Sent::Rename {
            recipient: recipient.name.clone(),
            filename: filename.to_string(),
            turn,
        })
    }

    async fn send_staleness_warning(&self, warning: &StalenessWarning) -> Result<(), NotifyError> {
        self.record(Sent::Stale {
            filename: warning.filename.clone(),
            participant: warning.participant.as_ref().map(|p| p.name.clone()),
        })
    }
}

/// Directory whose listing is swapped by the test. `None` simulates a read
/// failure.
#[derive(Clone, Default)]
struct FakeDirectory {
    listing: Arc<Mutex<Option<Vec<DirEntry>>>>,
}

impl FakeDirectory {
    fn set(&self, entries: Vec<DirEntry>) {
        *self.listing.lock().unwrap() = Some(entries);
    }

    fn fail(&self) {
        *self.listing.lock().unwrap() = None;
    }
}

impl DirectorySource for FakeDirectory {
    fn list_entries(&self, _path: &Path) -> io::Result<Vec<DirEntry>> {
        self.listing
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "access denied"))
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
}

fn file(name: &str) -> DirEntry {
    DirEntry::file(name, t0(), 2048)
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        watch_dir: PathBuf::from("/saves"),
        poll_interval: Duration::from_secs(5),
        debounce: Duration::from_secs(30),
        stale_check_interval: Duration::from_secs(24 * 60 * 60),
        stale_age_limit: Duration::from_secs(24 * 60 * 60),
    }
}

fn resolver(ignore: &[&str]) -> TurnResolver {
    let roster: Roster = "1 Alice A#1,2 Bob B#2,3 Cara C#3".parse().unwrap();
    let ignore: Vec<String> = ignore.iter().map(ToString::to_string).collect();
    TurnResolver::new(roster, "pbem1", &ignore)
}

fn monitor_with(
    settings: MonitorSettings,
    ignore: &[&str],
    notifier: Arc<RecordingNotifier>,
) -> (Monitor<FakeDirectory>, FakeDirectory) {
    let directory = FakeDirectory::default();
    directory.set(Vec::new());
    let monitor = Monitor::new(settings, directory.clone(), resolver(ignore), notifier, t0());
    (monitor, directory)
}

// =============================================================================
// Turn Resolution
// =============================================================================

#[tokio::test]
async fn test_turn_notice_sent_once_after_debounce() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("pbem1_turn5_bob")];

    let report = monitor.process(&entries, t0()).await;
    assert_eq!(report.outcome.discovered, vec!["pbem1_turn5_bob"]);
    assert!(report.decisions.is_empty());

    assert!(monitor.process(&entries, t0() + secs(29)).await.decisions.is_empty());
    assert!(notifier.sent().is_empty());

    let report = monitor.process(&entries, t0() + secs(30)).await;
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].delivered, Some(true));
    assert_eq!(report.turn, 5);
    assert_eq!(
        notifier.sent(),
        vec![Sent::Turn {
            current: "Bob".to_string(),
            next: "Cara".to_string(),
            turn: 5,
        }]
    );

    for n in 1..=10 {
        let report = monitor.process(&entries, t0() + secs(30 + n * 5)).await;
        assert!(report.decisions.is_empty());
    }
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_last_player_advances_turn() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("pbem1_turn5_cara")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;

    assert_eq!(report.turn, 6);
    assert_eq!(monitor.state().turn, 6);
    assert_eq!(
        notifier.sent(),
        vec![Sent::Turn {
            current: "Cara".to_string(),
            next: "Alice".to_string(),
            turn: 6,
        }]
    );
}

#[tokio::test]
async fn test_misnamed_file_requests_rename_from_previous_player() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("WrongName_Alice")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;

    assert!(matches!(
        report.decisions[0].resolution,
        Resolution::RenameRequested { .. }
    ));
    assert_eq!(report.turn, INITIAL_TURN);
    assert_eq!(
        notifier.sent(),
        vec![Sent::Rename {
            recipient: "Cara".to_string(),
            filename: "wrongname_alice".to_string(),
            turn: INITIAL_TURN,
        }]
    );
    assert!(monitor.state().tracker.get("wrongname_alice").unwrap().processed);
}

#[tokio::test]
async fn test_ignored_file_processed_silently() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &["backup"], notifier.clone());
    let entries = [file("pbem1_turn2_bob_backup")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;

    assert_eq!(
        report.decisions[0].resolution,
        Resolution::Ignored {
            pattern: "backup".to_string()
        }
    );
    assert_eq!(report.decisions[0].delivered, None);
    assert_eq!(report.turn, INITIAL_TURN);
    assert!(notifier.sent().is_empty());
    assert!(monitor
        .state()
        .tracker
        .get("pbem1_turn2_bob_backup")
        .unwrap()
        .processed);
}

#[tokio::test]
async fn test_unknown_player_marked_processed_without_notice() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("pbem1_turn3_dave")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;

    assert_eq!(
        report.decisions[0].resolution,
        Resolution::Unresolved(Unresolved::UnknownPlayer)
    );
    assert!(notifier.sent().is_empty());
    // The turn number is still inferred from the filename.
    assert_eq!(report.turn, 3);

    let report = monitor.process(&entries, t0() + secs(60)).await;
    assert!(report.decisions.is_empty());
}

#[tokio::test]
async fn test_turn_counter_never_decreases() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());

    let first = [file("pbem1_turn9_alice")];
    monitor.process(&first, t0()).await;
    monitor.process(&first, t0() + secs(30)).await;
    assert_eq!(monitor.state().turn, 9);

    let second = [file("pbem1_turn9_alice"), file("pbem1_turn2_bob")];
    monitor.process(&second, t0() + secs(40)).await;
    let report = monitor.process(&second, t0() + secs(70)).await;

    assert_eq!(report.turn, 9);
    assert_eq!(
        notifier.sent().last(),
        Some(&Sent::Turn {
            current: "Bob".to_string(),
            next: "Cara".to_string(),
            turn: 9,
        })
    );
}

#[tokio::test]
async fn test_files_stable_in_same_scan_processed_in_name_order() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("pbem1_turn3_cara"), file("pbem1_turn3_bob")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;

    let names: Vec<&str> = report
        .decisions
        .iter()
        .map(|d| d.filename.as_str())
        .collect();
    assert_eq!(names, vec!["pbem1_turn3_bob", "pbem1_turn3_cara"]);
    // Cara closes the round after Bob has been handled at turn 3.
    assert_eq!(
        notifier.sent(),
        vec![
            Sent::Turn {
                current: "Bob".to_string(),
                next: "Cara".to_string(),
                turn: 3,
            },
            Sent::Turn {
                current: "Cara".to_string(),
                next: "Alice".to_string(),
                turn: 4,
            },
        ]
    );
}

// =============================================================================
// Tracking Lifecycle
// =============================================================================

#[tokio::test]
async fn test_failed_delivery_still_marks_processed() {
    let notifier = Arc::new(RecordingNotifier::failing());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let entries = [file("pbem1_turn2_bob")];

    monitor.process(&entries, t0()).await;
    let report = monitor.process(&entries, t0() + secs(30)).await;
    assert_eq!(report.decisions[0].delivered, Some(false));

    let report = monitor.process(&entries, t0() + secs(60)).await;
    assert!(report.decisions.is_empty());
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_file_deleted_during_debounce_is_never_notified() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());

    monitor.process(&[file("pbem1_turn2_bob")], t0()).await;
    let report = monitor.process(&[], t0() + secs(10)).await;
    assert_eq!(report.outcome.removed, vec!["pbem1_turn2_bob"]);

    let report = monitor.process(&[], t0() + secs(40)).await;
    assert!(report.decisions.is_empty());
    assert!(monitor.state().tracker.is_empty());

    // Reappearing restarts the debounce window from scratch.
    monitor.process(&[file("pbem1_turn2_bob")], t0() + secs(50)).await;
    let report = monitor
        .process(&[file("pbem1_turn2_bob")], t0() + secs(70))
        .await;
    assert!(report.decisions.is_empty());
    let report = monitor
        .process(&[file("pbem1_turn2_bob")], t0() + secs(80))
        .await;
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_initialize_seeds_existing_files() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, directory) = monitor_with(settings(), &[], notifier.clone());
    directory.set(vec![file("pbem1_turn4_alice"), file("pbem1_turn4_bob")]);

    assert_eq!(monitor.initialize(t0()).unwrap(), 2);

    monitor.scan_once(t0() + secs(5)).await.unwrap();
    let report = monitor.scan_once(t0() + secs(60)).await.unwrap();
    assert!(report.decisions.is_empty());
    assert!(notifier.sent().is_empty());

    directory.set(vec![
        file("pbem1_turn4_alice"),
        file("pbem1_turn4_bob"),
        file("pbem1_turn4_cara"),
    ]);
    monitor.scan_once(t0() + secs(65)).await.unwrap();
    let report = monitor.scan_once(t0() + secs(95)).await.unwrap();
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.turn, 5);
}

#[tokio::test]
async fn test_initialize_fails_on_unreadable_directory() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, directory) = monitor_with(settings(), &[], notifier);
    directory.fail();

    let err = monitor.initialize(t0()).unwrap_err();
    assert!(matches!(err, MonitorError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
}

fn config_for(watch_dir: &Path, webhook_url: Option<&str>) -> Config {
    Config {
        roster: "1 Alice A#1,2 Bob B#2,3 Cara C#3".parse().unwrap(),
        game_name: "pbem1".to_string(),
        webhook_url: webhook_url.map(ToString::to_string),
        watch_dir: watch_dir.to_path_buf(),
        ignore_patterns: Vec::new(),
        debounce: Duration::from_secs(30),
        poll_interval: Duration::from_secs(5),
        stale_check_interval: Duration::from_secs(24 * 60 * 60),
        stale_age_limit: Duration::from_secs(24 * 60 * 60),
    }
}

#[test]
fn test_start_seeds_real_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(temp_dir.path().join("pbem1_turn3_Bob"), b"save").unwrap();
    std::fs::write(temp_dir.path().join("notes.txt"), b"hi").unwrap();
    std::fs::create_dir(temp_dir.path().join("archive")).unwrap();

    let monitor = Monitor::start(&config_for(temp_dir.path(), None), t0()).unwrap();

    let tracker = &monitor.state().tracker;
    assert_eq!(tracker.len(), 2);
    assert!(tracker.get("pbem1_turn3_bob").unwrap().processed);
    assert!(!tracker.contains("archive"));
    assert_eq!(monitor.watch_dir(), temp_dir.path());
}

#[test]
fn test_start_fails_on_missing_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("does-not-exist");

    let err = Monitor::start(&config_for(&missing, None), t0()).unwrap_err();

    assert!(matches!(err, MonitorError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
}

#[test]
fn test_start_rejects_invalid_webhook_url() {
    let temp_dir = tempfile::tempdir().unwrap();

    let err = Monitor::start(&config_for(temp_dir.path(), Some("not a url")), t0()).unwrap_err();

    assert!(matches!(err, MonitorError::Notify(NotifyError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_failed_directory_read_leaves_state_unchanged() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, directory) = monitor_with(settings(), &[], notifier.clone());
    directory.set(vec![file("pbem1_turn2_bob")]);
    monitor.scan_once(t0()).await.unwrap();

    directory.fail();
    assert!(monitor.scan_once(t0() + secs(10)).await.is_err());
    assert!(monitor.state().tracker.contains("pbem1_turn2_bob"));
    assert_eq!(
        monitor.state().tracker.get("pbem1_turn2_bob").unwrap().first_seen_at,
        t0()
    );

    directory.set(vec![file("pbem1_turn2_bob")]);
    let report = monitor.scan_once(t0() + secs(30)).await.unwrap();
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(notifier.sent().len(), 1);
}

// =============================================================================
// Staleness
// =============================================================================

#[tokio::test]
async fn test_staleness_warning_once_per_interval() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, directory) = monitor_with(settings(), &[], notifier.clone());
    let old = DirEntry::file("pbem1_turn4_bob", t0() - TimeDelta::hours(48), 2048);
    directory.set(vec![old]);
    monitor.initialize(t0()).unwrap();

    let mut warnings = 0;
    // 72 hours of scans every 5 minutes.
    for tick in 1..=864 {
        let report = monitor
            .scan_once(t0() + TimeDelta::minutes(5 * tick))
            .await
            .unwrap();
        if report.stale.is_some() {
            warnings += 1;
        }
    }

    assert_eq!(warnings, 3);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[0],
        Sent::Stale {
            filename: "pbem1_turn4_bob".to_string(),
            participant: Some("Bob".to_string()),
        }
    );
}

#[tokio::test]
async fn test_recent_save_suppresses_staleness_warning() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (mut monitor, _) = monitor_with(settings(), &[], notifier.clone());
    let recent = DirEntry::file("pbem1_turn4_bob", t0() + TimeDelta::hours(20), 2048);
    monitor.process(&[recent.clone()], t0()).await;

    let report = monitor
        .process(&[recent], t0() + TimeDelta::hours(24))
        .await;

    assert!(report.stale.is_none());
    assert_eq!(monitor.state().staleness.last_check(), t0() + TimeDelta::hours(24));
    assert!(!notifier
        .sent()
        .iter()
        .any(|s| matches!(s, Sent::Stale { .. })));
}

// =============================================================================
// Run Loop
// =============================================================================

#[tokio::test]
async fn test_run_scans_until_shutdown() {
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = MonitorSettings {
        poll_interval: Duration::from_millis(10),
        debounce: Duration::ZERO,
        ..settings()
    };
    let directory = FakeDirectory::default();
    directory.set(Vec::new());
    let mut monitor = Monitor::new(
        settings,
        directory.clone(),
        resolver(&[]),
        notifier.clone(),
        Utc::now(),
    );
    monitor.initialize(Utc::now()).unwrap();

    directory.set(vec![DirEntry::file("pbem1_turn1_alice", Utc::now(), 10)]);
    monitor
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert_eq!(
        notifier.sent(),
        vec![Sent::Turn {
            current: "Alice".to_string(),
            next: "Bob".to_string(),
            turn: 1,
        }]
    );
}
