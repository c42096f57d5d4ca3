use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wire SIGINT and SIGTERM to `token`, so an in-flight `Orchestrator::execute`
/// sees `cancel.is_cancelled()` become true at its next suspension point,
/// per spec.md §5's single cancel signal.
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = ctrl_c.await;
                    info!("received SIGINT, cancelling run");
                    token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, cancelling run"),
                _ = term.recv() => info!("received SIGTERM, cancelling run"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c, cancelling run");
        }
        token.cancel();
    });
}
