use std::any::Any;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::check::{evaluate, CheckOutcome};
use crate::config::RunConfig;
use crate::error::CheckError;
use crate::lambda::{list_lambdas, FunctionLister};
use crate::report::Reporter;
use crate::session::SessionProvider;
use crate::signals::ShutdownWatcher;
use crate::telemetry::LogControl;

/// Time given to the cluster to hand out a pod IP and credentials before the
/// first AWS call.
pub const WARMUP_INTERVAL: Duration = Duration::from_secs(15);

const CHECK_FAILURE_PREFIX: &str = "error occurred during Lambda check";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The outcome was accepted by the reporting sink.
    Reported(CheckOutcome),
    /// A shutdown signal arrived before the report was delivered.
    Interrupted(String),
    /// The reporting sink refused the outcome.
    ReportFailed,
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Reported(_) | Self::Interrupted(_) => 0,
            Self::ReportFailed => 1,
        }
    }
}

/// Drives one check run from environment to report.
pub struct Supervisor<P, R, S> {
    sessions: P,
    reporter: R,
    signals: S,
    log: LogControl,
    warmup: Duration,
}

impl<P, R, S> Supervisor<P, R, S>
where
    P: SessionProvider,
    R: Reporter,
    S: ShutdownWatcher,
{
    pub fn new(sessions: P, reporter: R, signals: S, log: LogControl) -> Self {
        Self {
            sessions,
            reporter,
            signals,
            log,
            warmup: WARMUP_INTERVAL,
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Runs the check and reports its outcome exactly once, unless a shutdown
    /// signal wins the race first.
    pub async fn run<F>(&self, lookup: F) -> Termination
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match RunConfig::from_lookup(lookup) {
            Ok(config) => config,
            Err(e) => return self.report(Err(e.into())).await,
        };

        self.log.apply_debug_settings(&config);
        if config.is_constrained() {
            info!("Expecting exactly {} Lambdas.", config.expected_count);
        } else {
            info!("Expecting at least one Lambda.");
        }

        // Give the k8s API enough time to allocate IPs.
        tokio::time::sleep(self.warmup).await;

        let session = match self.sessions.acquire().await {
            Ok(Some(session)) => session,
            Ok(None) => return self.report(Err(CheckError::NilSession)).await,
            Err(e) => return self.report(Err(e.into())).await,
        };
        let client = self.sessions.lambda_client(&session, &config.region);

        // A dropped sender means no signal will ever arrive, so the branch
        // stays pending instead of resolving.
        let watch = self.signals.watch();
        let shutdown = async move {
            match watch.await {
                Ok(signal) => signal,
                Err(_) => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);

        // Everything past this point runs inside the task so a panic surfaces
        // as a JoinError instead of taking the process down unreported.
        let check = tokio::spawn(run_lambda_check(client, config.expected_count));
        let abort = check.abort_handle();

        let result = tokio::select! {
            signal = &mut shutdown => {
                abort.abort();
                return interrupted(signal);
            }
            joined = check => recover(joined),
        };

        // Signals still end the run while the report is in flight.
        tokio::select! {
            signal = &mut shutdown => interrupted(signal),
            termination = self.report(result) => termination,
        }
    }

    async fn report(&self, result: Result<CheckOutcome, CheckError>) -> Termination {
        let outcome = match result {
            Ok(CheckOutcome::Success) => {
                info!("AWS Lambda check successful.");
                CheckOutcome::Success
            }
            Ok(CheckOutcome::Failure(reason)) => {
                CheckOutcome::Failure(format!("{}: {}", CHECK_FAILURE_PREFIX, reason))
            }
            Err(e) => CheckOutcome::Failure(e.to_string()),
        };

        info!("Check outcome: {}", outcome);

        let sent = match &outcome {
            CheckOutcome::Success => self.reporter.report_success().await,
            CheckOutcome::Failure(reason) => {
                error!("Reporting errors to Kuberhealthy: {}", reason);
                self.reporter.report_failure(vec![reason.clone()]).await
            }
        };

        match sent {
            Ok(()) => Termination::Reported(outcome),
            Err(e) => {
                error!("error reporting to kuberhealthy: {}", e);
                Termination::ReportFailed
            }
        }
    }
}

fn interrupted(signal: String) -> Termination {
    info!("Received an interrupt signal from the signal channel.");
    debug!("Signal received was: {}", signal);
    info!("Shutting down.");
    Termination::Interrupted(signal)
}

async fn run_lambda_check<L>(client: L, expected_count: usize) -> Result<CheckOutcome, CheckError>
where
    L: FunctionLister,
{
    let functions = list_lambdas(&client).await?;
    Ok(evaluate(&functions, expected_count))
}

fn recover(
    joined: Result<Result<CheckOutcome, CheckError>, JoinError>,
) -> Result<CheckOutcome, CheckError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic().as_ref());
            error!("Recovered panic: {}", message);
            Err(CheckError::Panic(message))
        }
        Err(e) => Err(CheckError::Panic(e.to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ListPageError, ReportError, SessionError};
    use crate::lambda::{FunctionPage, MockFunctionLister};
    use crate::report::MockReporter;
    use async_trait::async_trait;
    use aws_sdk_lambda::types::FunctionConfiguration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    enum SessionBehavior {
        Ready,
        Missing,
        Broken,
    }

    struct FakeSessions<C> {
        behavior: SessionBehavior,
        client: Mutex<Option<C>>,
        acquired: AtomicUsize,
    }

    impl<C> FakeSessions<C> {
        fn new(behavior: SessionBehavior, client: C) -> Self {
            Self {
                behavior,
                client: Mutex::new(Some(client)),
                acquired: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl<C> SessionProvider for FakeSessions<C>
    where
        C: FunctionLister + 'static,
    {
        type Session = ();
        type Client = C;

        async fn acquire(&self) -> Result<Option<()>, SessionError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                SessionBehavior::Ready => Ok(Some(())),
                SessionBehavior::Missing => Ok(None),
                SessionBehavior::Broken => Err(SessionError::Credentials(
                    "no providers in chain".to_string(),
                )),
            }
        }

        fn lambda_client(&self, _session: &(), _region: &str) -> C {
            self.client
                .lock()
                .expect("poisoned mutex")
                .take()
                .expect("client built twice")
        }
    }

    struct FakeSignals {
        fire: Option<&'static str>,
    }

    impl ShutdownWatcher for FakeSignals {
        fn watch(&self) -> oneshot::Receiver<String> {
            let (tx, rx) = oneshot::channel();
            if let Some(signal) = self.fire {
                let _ = tx.send(signal.to_string());
            }
            rx
        }
    }

    /// Delivers `signal` once `delay` has passed.
    struct DelayedSignals {
        signal: &'static str,
        delay: Duration,
    }

    impl ShutdownWatcher for DelayedSignals {
        fn watch(&self) -> oneshot::Receiver<String> {
            let (tx, rx) = oneshot::channel();
            let (signal, delay) = (self.signal, self.delay);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(signal.to_string());
            });
            rx
        }
    }

    /// A sink whose requests never complete.
    #[derive(Default)]
    struct HangingReporter {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Reporter for HangingReporter {
        async fn report_success(&self) -> Result<(), ReportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn report_failure(&self, _messages: Vec<String>) -> Result<(), ReportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct StalledLister;

    #[async_trait]
    impl FunctionLister for StalledLister {
        async fn list_page(
            &self,
            _marker: Option<String>,
            _max_items: i32,
        ) -> Result<FunctionPage, ListPageError> {
            std::future::pending().await
        }
    }

    struct PanickingLister;

    #[async_trait]
    impl FunctionLister for PanickingLister {
        async fn list_page(
            &self,
            _marker: Option<String>,
            _max_items: i32,
        ) -> Result<FunctionPage, ListPageError> {
            panic!("lister exploded")
        }
    }

    fn page(n: usize, next_marker: Option<&str>) -> FunctionPage {
        FunctionPage {
            functions: (0..n)
                .map(|i| {
                    FunctionConfiguration::builder()
                        .function_name(format!("fn-{i}"))
                        .build()
                })
                .collect(),
            next_marker: next_marker.map(str::to_string),
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| env.get(name).cloned()
    }

    fn supervisor<C>(
        sessions: FakeSessions<C>,
        reporter: MockReporter,
        fire: Option<&'static str>,
    ) -> Supervisor<FakeSessions<C>, MockReporter, FakeSignals>
    where
        C: FunctionLister + 'static,
    {
        Supervisor::new(sessions, reporter, FakeSignals { fire }, LogControl::disabled())
            .with_warmup(Duration::ZERO)
    }

    fn expect_failure(reporter: &mut MockReporter, needle: &'static str) {
        reporter.expect_report_success().never();
        reporter
            .expect_report_failure()
            .withf(move |messages| messages.len() == 1 && messages[0].contains(needle))
            .times(1)
            .returning(|_| Ok(()));
    }

    #[tokio::test]
    async fn test_two_pages_report_success() {
        let mut lister = MockFunctionLister::new();
        let mut seq = mockall::Sequence::new();
        lister
            .expect_list_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(2, Some("next"))));
        lister
            .expect_list_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(page(1, None)));

        let mut reporter = MockReporter::new();
        reporter.expect_report_success().times(1).returning(|| Ok(()));
        reporter.expect_report_failure().never();

        let termination = supervisor(FakeSessions::new(SessionBehavior::Ready, lister), reporter, None)
            .run(env(&[]))
            .await;

        assert_eq!(termination, Termination::Reported(CheckOutcome::Success));
        assert_eq!(termination.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_no_functions_reports_failure() {
        let mut lister = MockFunctionLister::new();
        lister
            .expect_list_page()
            .times(1)
            .returning(|_, _| Ok(FunctionPage::default()));

        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "could not find any Lambdas");

        let termination = supervisor(FakeSessions::new(SessionBehavior::Ready, lister), reporter, None)
            .run(env(&[]))
            .await;

        assert_eq!(
            termination,
            Termination::Reported(CheckOutcome::failure(
                "error occurred during Lambda check: could not find any Lambdas"
            ))
        );
        assert_eq!(termination.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_count_mismatch_reports_both_counts() {
        let mut lister = MockFunctionLister::new();
        lister
            .expect_list_page()
            .times(1)
            .returning(|_, _| Ok(page(4, None)));

        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "expected 5, but got 4");

        supervisor(FakeSessions::new(SessionBehavior::Ready, lister), reporter, None)
            .run(env(&[("LAMBDA_COUNT", "5")]))
            .await;
    }

    #[tokio::test]
    async fn test_bad_config_fails_before_session() {
        let lister = MockFunctionLister::new();
        let sessions = FakeSessions::new(SessionBehavior::Ready, lister);

        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "LAMBDA_COUNT");

        let supervisor = supervisor(sessions, reporter, None);
        supervisor.run(env(&[("LAMBDA_COUNT", "abc")])).await;

        assert_eq!(supervisor.sessions.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nil_session_skips_listing() {
        let lister = MockFunctionLister::new();
        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "nil AWS session");

        let termination = supervisor(FakeSessions::new(SessionBehavior::Missing, lister), reporter, None)
            .run(env(&[]))
            .await;

        assert_eq!(
            termination,
            Termination::Reported(CheckOutcome::failure("nil AWS session"))
        );
    }

    #[tokio::test]
    async fn test_session_error_is_reported() {
        let lister = MockFunctionLister::new();
        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "failed to create AWS session");

        supervisor(FakeSessions::new(SessionBehavior::Broken, lister), reporter, None)
            .run(env(&[]))
            .await;
    }

    #[tokio::test]
    async fn test_enumeration_error_is_reported() {
        let mut lister = MockFunctionLister::new();
        lister
            .expect_list_page()
            .times(1)
            .returning(|_, _| Err(ListPageError::new("ThrottlingException: Rate exceeded")));

        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "Rate exceeded");

        supervisor(FakeSessions::new(SessionBehavior::Ready, lister), reporter, None)
            .run(env(&[]))
            .await;
    }

    #[tokio::test]
    async fn test_panic_is_recovered_and_reported() {
        let mut reporter = MockReporter::new();
        expect_failure(&mut reporter, "panic: lister exploded");

        let termination = supervisor(
            FakeSessions::new(SessionBehavior::Ready, PanickingLister),
            reporter,
            None,
        )
            .run(env(&[]))
            .await;

        assert_eq!(termination.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_signal_interrupts_without_reporting() {
        let mut reporter = MockReporter::new();
        reporter.expect_report_success().never();
        reporter.expect_report_failure().never();

        let termination = supervisor(
            FakeSessions::new(SessionBehavior::Ready, StalledLister),
            reporter,
            Some("SIGTERM"),
        )
        .run(env(&[]))
        .await;

        assert_eq!(termination, Termination::Interrupted("SIGTERM".to_string()));
        assert_eq!(termination.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_signal_during_report_ends_run() {
        let mut lister = MockFunctionLister::new();
        lister
            .expect_list_page()
            .times(1)
            .returning(|_, _| Ok(page(1, None)));

        let supervisor = Supervisor::new(
            FakeSessions::new(SessionBehavior::Ready, lister),
            HangingReporter::default(),
            DelayedSignals {
                signal: "SIGTERM",
                delay: Duration::from_millis(100),
            },
            LogControl::disabled(),
        )
        .with_warmup(Duration::ZERO);

        let termination = tokio::time::timeout(Duration::from_secs(5), supervisor.run(env(&[])))
            .await
            .expect("run should end once the signal arrives");

        assert_eq!(termination, Termination::Interrupted("SIGTERM".to_string()));
        assert_eq!(termination.exit_code(), 0);
        assert_eq!(supervisor.reporter.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let mut lister = MockFunctionLister::new();
        lister
            .expect_list_page()
            .times(1)
            .returning(|_, _| Ok(page(1, None)));

        let mut reporter = MockReporter::new();
        reporter
            .expect_report_success()
            .times(1)
            .returning(|| Err(ReportError::MissingUrl));

        let termination = supervisor(FakeSessions::new(SessionBehavior::Ready, lister), reporter, None)
            .run(env(&[]))
            .await;

        assert_eq!(termination, Termination::ReportFailed);
        assert_eq!(termination.exit_code(), 1);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic payload");
    }
}
