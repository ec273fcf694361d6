use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, format_err};
use clap::ArgMatches;
use relaydelay_config::Config;
use reqwest::blocking::Client;

/// Builds the URL of the health endpoint for the given check.
fn health_url(addr: SocketAddr, mode: &str) -> String {
    format!("http://{addr}/api/health/{mode}")
}

pub fn healthcheck(config: &Config, matches: &ArgMatches) -> Result<()> {
    let mode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("ready");

    let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(10);

    let addr = matches
        .get_one::<SocketAddr>("addr")
        .copied()
        .unwrap_or(config.listen_addr());

    let client = Client::builder()
        .timeout(Some(Duration::from_secs(timeout)))
        .build()
        .unwrap_or_default();

    let response = client.get(health_url(addr, mode)).send();

    match response {
        Ok(response) => {
            if response.status().is_success() {
                Ok(())
            } else {
                relaydelay_log::error!(
                    "relaydelay is unhealthy. Status code: {}",
                    response.status()
                );
                Err(format_err!(
                    "relaydelay is unhealthy. Status code: {}",
                    response.status()
                ))
            }
        }
        Err(err) => {
            relaydelay_log::error!("relaydelay is unhealthy. Error: {err}");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_health_url() {
        let addr: SocketAddr = "127.0.0.1:9119".parse().unwrap();
        assert_eq!(
            health_url(addr, "live"),
            "http://127.0.0.1:9119/api/health/live"
        );
    }
}
