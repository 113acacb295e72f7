//! Process signal handling.
//!
//! The first SIGINT or SIGTERM (Ctrl+C elsewhere) triggers the shutdown
//! coordinator; a second one force-exits with status 130.

use std::io;
use std::sync::Arc;

use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_engine::ShutdownCoordinator;

pub fn install(coordinator: Arc<ShutdownCoordinator>) -> io::Result<()> {
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())?
    };

    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            engine_error!("Cannot listen for Ctrl+C: {}", err);
                            return;
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    engine_error!("Cannot listen for Ctrl+C: {}", err);
                    return;
                }
            }

            if coordinator.trigger() {
                engine_info!("Press Ctrl+C again to force exit");
            } else {
                engine_warn!("Force exit requested");
                std::process::exit(130);
            }
        }
    });
    Ok(())
}
