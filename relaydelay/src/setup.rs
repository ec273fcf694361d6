use anyhow::Result;
use relaydelay_config::Config;

/// Validates settings that are valid on their own but make no sense for running the collector.
pub fn check_config(config: &Config) -> Result<()> {
    if config.relay_nodes().is_empty() {
        relaydelay_log::warn!(
            "no relays are configured in `relays.nodes`, all readings will be ignored"
        );
    }

    if !config.metrics_enabled() && !config.push_gateway().enabled {
        anyhow::bail!(
            "metrics are neither served nor pushed. Enable `metrics.enabled` or \
             `metrics.push_gateway.enabled`."
        );
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        relaydelay_log::info!("launching relaydelay without config folder");
    } else {
        relaydelay_log::info!(
            "launching relaydelay from config folder {}",
            config.path().display()
        );
    }

    relaydelay_log::info!("  listen address: {}", config.listen_addr());
    relaydelay_log::info!(
        "  telemetry store: {}/{}",
        config.store_database(),
        config.store_collection()
    );
    relaydelay_log::info!("  collection period: {:?}", config.collection_period());
    relaydelay_log::info!("  relays: {}", config.relay_nodes().len());
    relaydelay_log::info!("  log level: {}", config.logging().level);
}

/// Returns the name of this instance used as grouping key when pushing metrics.
pub fn instance_name() -> String {
    hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned())
}
