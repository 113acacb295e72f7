mod compare;
mod config;
mod signal;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use engine_logging::{engine_error, engine_info, engine_warn, LogDestination};
use harvester_core::RenewalSettings;
use harvester_engine::{
    write_rows, HarvestSettings, Harvester, KeycloakProvider, ReqwestTransport, RetryPolicy,
    RetryingTransport, ShutdownCoordinator, TokenHandle, TokenManager, TokenSettings,
    TransportSettings,
};

use crate::compare::difference;
use crate::config::AppConfig;

type SourceHarvester = Harvester<RetryingTransport<ReqwestTransport>, TokenHandle>;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let config = AppConfig::from_env()?;
    engine_logging::initialize(config.log_level, LogDestination::Both);
    if let Err(err) = dotenv {
        engine_warn!("Could not load .env file: {}", err);
    }

    let coordinator = Arc::new(ShutdownCoordinator::new());
    signal::install(coordinator.clone()).context("cannot install signal handlers")?;

    if let Err(err) = run(&config, &coordinator).await {
        engine_error!("{:#}", err);
        coordinator.shutdown().await;
        return Err(err);
    }

    engine_info!("Harvest complete, waiting for shutdown signal");
    coordinator.token().cancelled().await;
    coordinator.shutdown().await;
    Ok(())
}

async fn run(config: &AppConfig, coordinator: &ShutdownCoordinator) -> Result<()> {
    let transport_settings = TransportSettings::default();
    let provider = KeycloakProvider::new(
        &config.auth_url,
        config.credentials.clone(),
        &transport_settings,
    )?;
    let token_settings = TokenSettings {
        renewal: RenewalSettings {
            cooldown: config.renewal_cooldown,
            ..RenewalSettings::default()
        },
        ..TokenSettings::default()
    };
    let (manager, tokens) = TokenManager::start(provider, token_settings, &coordinator.token())
        .await
        .context("initial login failed")?;
    coordinator.spawn(manager.run(coordinator.token()));

    let transport = RetryingTransport::new(
        ReqwestTransport::new(transport_settings)?,
        RetryPolicy::transport(),
    );
    let harvester = Harvester::new(
        Arc::new(transport),
        Arc::new(tokens),
        HarvestSettings {
            workers: config.workers,
            ..HarvestSettings::default()
        },
    );

    let [first, second, baseline] = &config.sources;
    let (first, second, baseline) = tokio::join!(
        harvest_source(&harvester, first, &config.output_dir, coordinator),
        harvest_source(&harvester, second, &config.output_dir, coordinator),
        harvest_source(&harvester, baseline, &config.output_dir, coordinator),
    );
    let (first, second, baseline) = (first?, second?, baseline?);

    write_rows(
        &config.output_dir,
        "s1missing.csv",
        difference(&baseline, &first).into_iter().map(|item| vec![item]),
    )?;
    write_rows(
        &config.output_dir,
        "s2missing.csv",
        difference(&baseline, &second).into_iter().map(|item| vec![item]),
    )?;
    Ok(())
}

/// Harvest one source and write its items to the source's own row file.
async fn harvest_source(
    harvester: &SourceHarvester,
    raw: &str,
    output_dir: &Path,
    coordinator: &ShutdownCoordinator,
) -> Result<Vec<String>> {
    let report = harvester
        .harvest(raw, coordinator.token())
        .await
        .with_context(|| format!("cannot harvest {raw}"))?;
    if report.cancelled {
        engine_warn!("Harvest of {} was cancelled, writing partial results", raw);
    }

    let path = write_rows(output_dir, &report.output_filename, report.rows())?;
    engine_info!("Saved {} items to {}", report.items.len(), path.display());
    Ok(report.items)
}
