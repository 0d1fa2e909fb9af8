use tokio::sync::oneshot;
use tracing::warn;

/// Starts watching for shutdown. The receiver fires at most once, with the
/// name of the signal; a dropped sender means nothing will ever arrive.
pub trait ShutdownWatcher {
    fn watch(&self) -> oneshot::Receiver<String>;
}

/// SIGINT and SIGTERM, watched from a background task.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

impl ShutdownWatcher for OsSignals {
    fn watch(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Some(signal) = wait_for_signal().await {
                let _ = tx.send(signal);
            }
        });
        rx
    }
}

async fn wait_for_signal() -> Option<String> {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some("SIGINT".to_string()),
            Err(e) => {
                warn!("Failed to install SIGINT handler: {}", e);
                std::future::pending::<Option<String>>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await.map(|_| "SIGTERM".to_string()),
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<Option<String>>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<String>>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
