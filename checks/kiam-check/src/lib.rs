//! Kuberhealthy check that proves pod IAM credentials work by listing the
//! account's Lambda functions and comparing the count with what is expected.

pub mod check;
pub mod config;
pub mod error;
pub mod lambda;
pub mod report;
pub mod session;
pub mod signals;
pub mod supervisor;
pub mod telemetry;

pub use check::{evaluate, CheckOutcome};
pub use config::RunConfig;
pub use error::{
    CheckError, ConfigError, EnumerationError, ListPageError, ReportError, SessionError,
};
pub use lambda::{list_lambdas, FunctionLister, FunctionPage, MAX_PAGES, PAGE_SIZE};
pub use report::{KuberhealthyReporter, Report, Reporter, ReporterSettings};
pub use session::{AwsSessionProvider, SessionProvider};
pub use signals::{OsSignals, ShutdownWatcher};
pub use supervisor::{Supervisor, Termination, WARMUP_INTERVAL};
pub use telemetry::LogControl;
