use anyhow::Context;
use kiam_check::{telemetry, AwsSessionProvider, KuberhealthyReporter, OsSignals, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log = telemetry::init();

    let reporter =
        KuberhealthyReporter::from_env().context("failed to build the Kuberhealthy reporter")?;

    let termination = Supervisor::new(AwsSessionProvider, reporter, OsSignals, log)
        .run(|name| std::env::var(name).ok())
        .await;

    std::process::exit(termination.exit_code())
}
