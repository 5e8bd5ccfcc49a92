use std::future::Future;
use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownSignal {
    Terminate,
    Interrupt,
}

/// Install a handler that cancels the returned token on SIGTERM or SIGINT.
///
/// The dashboard and the status poller watch this token; the remote session
/// is closed once both have stopped.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl-C only");
                    std::future::pending::<()>().await;
                }
            }
        };

        match first_signal(terminate, tokio::signal::ctrl_c()).await {
            ShutdownSignal::Terminate => tracing::info!("Received SIGTERM, shutting down"),
            ShutdownSignal::Interrupt => tracing::info!("Received SIGINT, shutting down"),
        }
        trigger.cancel();
    });

    token
}

/// Resolves on the first signal that actually arrives. A broken interrupt
/// listener leaves only `terminate` to wait on.
async fn first_signal<T, I>(terminate: T, interrupt: I) -> ShutdownSignal
where
    T: Future<Output = ()>,
    I: Future<Output = io::Result<()>>,
{
    tokio::pin!(terminate);

    tokio::select! {
        () = &mut terminate => return ShutdownSignal::Terminate,
        result = interrupt => match result {
            Ok(()) => return ShutdownSignal::Interrupt,
            Err(e) => {
                tracing::error!(error = %e, "Ctrl-C listener failed, waiting for SIGTERM only");
            }
        },
    }

    terminate.await;
    ShutdownSignal::Terminate
}
