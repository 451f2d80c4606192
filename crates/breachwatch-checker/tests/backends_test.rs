use async_trait::async_trait;
use breachwatch_checker::{
    BackendTable, BreachChecker, BreachEvidence, CheckError, CheckOptions, CheckOrchestrator,
    CloudbleedChecker, Entry, HibpChecker, HttpResponse, HttpTransport, MemoryDatabase,
    ProgressAggregator, ProgressSink, PwnedPasswordsChecker, RetryPolicy, SessionState, TransportError,
};
use breachwatch_core::{AppConfig, BreachSource, EntryId, SessionConfig};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Responder = Box<dyn Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Transport that records every URL and answers from a script, then from a
/// fallback responder.
struct FakeTransport {
    requests: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Responder,
}

impl FakeTransport {
    fn new(fallback: impl Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync + 'static) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
        }
    }

    fn scripted(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        let transport = Self::new(|url| panic!("unscripted request to {url}"));
        *transport.script.lock().expect("acquire script lock") = responses.into();
        transport
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("acquire requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .expect("acquire requests lock")
            .push(url.to_string());
        let scripted = self.script.lock().expect("acquire script lock").pop_front();
        match scripted {
            Some(response) => response,
            None => (self.fallback)(url),
        }
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        rate_limit_multiplier: 2,
    }
}

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid date")
}

fn entry(id: &str, url: &str, password: &str, modified: DateTime<Utc>) -> Entry {
    Entry {
        id: EntryId::new(id).expect("valid entry ID"),
        title: format!("Entry {id}"),
        username: "alice".to_string(),
        password: password.to_string(),
        url: url.to_string(),
        last_modified: modified,
        expires: None,
        in_recycle_bin: false,
        groups: Vec::new(),
    }
}

fn options(only_old: bool) -> CheckOptions {
    CheckOptions {
        expire_breached_entries: false,
        only_check_old_entries: only_old,
        ignore_deleted_entries: true,
    }
}

// SHA-1("password") = 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
const PASSWORD_RANGE: &str = "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n\
                              1E4C9B93F3F0682250B6CF8331B7EE68FD8:9545824\r\n\
                              011053FD0102E94D6AE2F8B83D76FAF94F6:1";

fn pwned_passwords(transport: Arc<FakeTransport>) -> PwnedPasswordsChecker {
    PwnedPasswordsChecker::new(transport, "https://pwned.test/".to_string(), fast_retry())
        .with_max_concurrent(1)
}

#[tokio::test]
async fn test_pwned_password_is_flagged() {
    let transport = Arc::new(FakeTransport::new(|url| {
        if url.ends_with("/range/5BAA6") {
            Ok(HttpResponse::new(200, PASSWORD_RANGE))
        } else {
            Ok(HttpResponse::new(200, "0018A45C4D1DEF81644B54AB7F969B88D65:1"))
        }
    }));
    let checker = pwned_passwords(Arc::clone(&transport));

    let entries = vec![
        entry("e1", "", "password", Utc::now()),
        entry("e2", "", "a much better passphrase", Utc::now()),
    ];
    let found = checker
        .check_database(
            &entries,
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("check passwords");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entry_id.as_str(), "e1");
    assert_eq!(found[0].source, BreachSource::PwnedPasswords);
    assert_eq!(
        found[0].evidence,
        BreachEvidence::PasswordExposure {
            occurrences: 9_545_824
        }
    );

    // Only the five-character prefix leaves the process.
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    for url in &requests {
        let prefix = url.rsplit('/').next().expect("range prefix");
        assert_eq!(prefix.len(), 5);
        assert!(!url.contains("password"));
        assert!(!url.contains("1E4C9B93F3F0682250B6CF8331B7EE68FD8"));
    }
    assert_eq!(requests[0], "https://pwned.test/range/5BAA6");
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(HttpResponse::new(429, "slow down")),
        Ok(HttpResponse::new(200, PASSWORD_RANGE)),
    ]));
    let checker = pwned_passwords(Arc::clone(&transport));

    let entries = vec![entry("e1", "", "password", Utc::now())];
    let found = checker
        .check_database(
            &entries,
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("check passwords");

    assert_eq!(found.len(), 1);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_skip_the_entry() {
    let transport = Arc::new(FakeTransport::new(|_| {
        Err(TransportError::Timeout("deadline elapsed".to_string()))
    }));
    let checker = pwned_passwords(Arc::clone(&transport));

    let entries = vec![
        entry("e1", "", "password", Utc::now()),
        entry("e2", "", "hunter2", Utc::now()),
    ];
    let found = checker
        .check_database(
            &entries,
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("transient failures are not run-fatal");

    assert!(found.is_empty());
    assert_eq!(transport.requests().len(), 6);
}

#[tokio::test]
async fn test_unauthorized_is_run_fatal() {
    let transport = Arc::new(FakeTransport::new(|url| {
        if url.ends_with("/range/5BAA6") {
            Ok(HttpResponse::new(200, PASSWORD_RANGE))
        } else {
            Ok(HttpResponse::new(401, "Access denied"))
        }
    }));
    let checker = pwned_passwords(Arc::clone(&transport));

    let entries = vec![
        entry("e1", "", "password", Utc::now()),
        entry("e2", "", "hunter2", Utc::now()),
        entry("e3", "", "letmein", Utc::now()),
    ];
    let err = checker
        .check_database(
            &entries,
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("401 must abort the backend");

    match err {
        CheckError::BackendFailure {
            backend,
            reason,
            found,
        } => {
            assert_eq!(backend, BreachSource::PwnedPasswords);
            assert!(reason.contains("401"));
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].entry_id.as_str(), "e1");
        }
        other => panic!("expected backend failure, got {other:?}"),
    }
    // Not retried, and the third entry was never looked up.
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_no_eligible_entries_means_no_requests() {
    let transport = Arc::new(FakeTransport::new(|url| panic!("unexpected request to {url}")));

    let mut deleted = entry("e1", "https://adobe.com", "password", date(2010, 1, 1));
    deleted.in_recycle_bin = true;
    let entries = vec![deleted];

    let checkers: Vec<Box<dyn BreachChecker>> = vec![
        Box::new(HibpChecker::new(
            transport.clone(),
            "https://hibp.test/api/v3".to_string(),
            fast_retry(),
        )),
        Box::new(CloudbleedChecker::new(
            transport.clone(),
            "https://lists.test/cloudbleed.txt".to_string(),
            fast_retry(),
        )),
        Box::new(pwned_passwords(Arc::clone(&transport))),
    ];

    for checker in checkers {
        let found = checker
            .check_database(
                &entries,
                &options(false),
                &ProgressSink::detached(),
                &CancellationToken::new(),
            )
            .await
            .expect("empty check succeeds");
        assert!(found.is_empty(), "{} flagged a deleted entry", checker.source());
    }
    assert!(transport.requests().is_empty());
}

const BREACHES: &str = r#"[
    {
        "Name": "Adobe",
        "Title": "Adobe",
        "Domain": "adobe.com",
        "BreachDate": "2013-10-04",
        "AddedDate": "2013-12-04T00:00:00Z",
        "DataClasses": ["Email addresses", "Password hints", "Passwords", "Usernames"],
        "IsVerified": true
    },
    {
        "Name": "Dropbox",
        "Title": "Dropbox",
        "Domain": "dropbox.com",
        "BreachDate": "2012-07-01",
        "IsVerified": true
    }
]"#;

fn hibp(transport: Arc<FakeTransport>) -> HibpChecker {
    HibpChecker::new(transport, "https://hibp.test/api/v3/".to_string(), fast_retry())
}

fn site_entries() -> Vec<Entry> {
    vec![
        entry("e1", "https://login.adobe.com/signin", "pw", date(2012, 5, 1)),
        entry("e2", "adobe.com", "pw", date(2020, 3, 1)),
        entry("e3", "https://www.dropbox.com", "pw", date(2011, 1, 1)),
        entry("e4", "https://example.org", "pw", date(2010, 1, 1)),
    ]
}

#[tokio::test]
async fn test_hibp_matches_by_domain() {
    let transport = Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, BREACHES))));
    let found = hibp(Arc::clone(&transport))
        .check_database(
            &site_entries(),
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("check breaches");

    let ids: Vec<&str> = found.iter().map(|r| r.entry_id.as_str()).collect();
    assert_eq!(ids, vec!["e1", "e2", "e3"]);
    assert_eq!(transport.requests(), vec!["https://hibp.test/api/v3/breaches"]);

    match &found[0].evidence {
        BreachEvidence::SiteBreach {
            name, data_classes, ..
        } => {
            assert_eq!(name, "Adobe");
            assert_eq!(data_classes.len(), 4);
        }
        other => panic!("unexpected evidence {other:?}"),
    }
}

#[tokio::test]
async fn test_hibp_old_only_skips_entries_changed_after_breach() {
    let transport = Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, BREACHES))));
    let found = hibp(transport)
        .check_database(
            &site_entries(),
            &options(true),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("check breaches");

    let ids: Vec<&str> = found.iter().map(|r| r.entry_id.as_str()).collect();
    assert_eq!(ids, vec!["e1", "e3"]);
}

#[tokio::test]
async fn test_hibp_old_only_fetches_catalogue_once_when_nothing_is_stale() {
    let transport = Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, BREACHES))));
    let entries = vec![
        entry("e1", "https://adobe.com", "pw", date(2020, 1, 1)),
        entry("e2", "https://dropbox.com", "pw", date(2021, 6, 1)),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = ProgressSink::new(Arc::new(ProgressAggregator::new(1, tx)));

    let found = hibp(Arc::clone(&transport))
        .check_database(&entries, &options(true), &sink, &CancellationToken::new())
        .await
        .expect("check breaches");

    assert!(found.is_empty());
    assert_eq!(transport.requests(), vec!["https://hibp.test/api/v3/breaches"]);

    let mut last = 0.0;
    while let Ok(update) = rx.try_recv() {
        last = update.percent;
    }
    assert!((last - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_hibp_unavailable_catalogue_is_run_fatal() {
    let transport = Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(503, "maintenance"))));
    let err = hibp(Arc::clone(&transport))
        .check_database(
            &site_entries(),
            &options(false),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("no catalogue, no check");

    assert!(matches!(
        err,
        CheckError::BackendFailure {
            backend: BreachSource::HaveIBeenPwned,
            ..
        }
    ));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_cloudbleed_matches_parent_domain() {
    let transport = Arc::new(FakeTransport::new(|_| {
        Ok(HttpResponse::new(200, "# affected sites\nuber.com\nreddit.com\n"))
    }));
    let checker = CloudbleedChecker::new(
        transport,
        "https://lists.test/cloudbleed.txt".to_string(),
        fast_retry(),
    );

    let entries = vec![
        entry("e1", "https://m.uber.com/login", "pw", date(2016, 6, 1)),
        entry("e2", "https://reddit.com", "pw", date(2018, 1, 1)),
        entry("e3", "https://example.org", "pw", date(2016, 1, 1)),
    ];
    let found = checker
        .check_database(
            &entries,
            &options(true),
            &ProgressSink::detached(),
            &CancellationToken::new(),
        )
        .await
        .expect("check cloudbleed");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entry_id.as_str(), "e1");
    assert_eq!(
        found[0].evidence,
        BreachEvidence::CloudflareLeak {
            domain: "uber.com".to_string()
        }
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let transport = Arc::new(FakeTransport::new(|url| panic!("unexpected request to {url}")));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pwned_passwords(Arc::clone(&transport))
        .check_database(
            &[entry("e1", "", "password", Utc::now())],
            &options(false),
            &ProgressSink::detached(),
            &cancel,
        )
        .await
        .expect_err("cancelled");

    assert!(matches!(err, CheckError::Cancelled { found } if found.is_empty()));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_cancelled_session_keeps_passwords_already_flagged() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let calls = AtomicUsize::new(0);
    let transport = Arc::new(FakeTransport::new(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 1 {
            trigger.cancel();
        }
        Ok(HttpResponse::new(200, PASSWORD_RANGE))
    }));

    let orchestrator = CheckOrchestrator::new(Arc::new(BackendTable::new(
        transport,
        &AppConfig::default(),
    )));
    let db = MemoryDatabase::new(vec![
        entry("e1", "", "password", Utc::now()),
        entry("e2", "", "password", Utc::now()),
        entry("e3", "", "password", Utc::now()),
    ]);
    let config = SessionConfig {
        selected_backend: BreachSource::PwnedPasswords,
        ..SessionConfig::default()
    };
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run_session(&db, &config, tx, &cancel)
        .await
        .expect("run session");

    assert_eq!(outcome.state(), SessionState::Cancelled);
    let ids: Vec<&str> = outcome
        .results()
        .iter()
        .map(|r| r.entry_id.as_str())
        .collect();
    assert!(ids.contains(&"e1"), "e1 was flagged before cancellation: {ids:?}");
    assert!(!ids.contains(&"e3"));
}

#[tokio::test]
async fn test_cancelled_backend_returns_found_records() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let calls = AtomicUsize::new(0);
    let transport = Arc::new(FakeTransport::new(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 1 {
            trigger.cancel();
        }
        Ok(HttpResponse::new(200, PASSWORD_RANGE))
    }));

    let entries = vec![
        entry("e1", "", "password", Utc::now()),
        entry("e2", "", "password", Utc::now()),
        entry("e3", "", "password", Utc::now()),
    ];
    let err = pwned_passwords(Arc::clone(&transport))
        .check_database(&entries, &options(false), &ProgressSink::detached(), &cancel)
        .await
        .expect_err("cancelled mid-run");

    match err {
        CheckError::Cancelled { found } => {
            let ids: Vec<&str> = found.iter().map(|r| r.entry_id.as_str()).collect();
            assert_eq!(ids, vec!["e1", "e2"]);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(transport.requests().len(), 2);
}
