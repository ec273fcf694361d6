use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::ArgMatches;
use relaydelay_config::{Config, OverridableConfig};

use crate::{cliapp, decode, healthcheck, setup};

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = cliapp::make_app();
    let matches = app.get_matches();

    // Decoding a blob is an offline tool and works without a config folder.
    if let Some(matches) = matches.subcommand_matches("decode") {
        return decode::decode(matches);
    }

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(".relaydelay"));

    let mut config = Config::from_path(&config_path)?;
    if let Some(matches) = matches.subcommand_matches("run") {
        config.apply_override(extract_config_args(matches))?;
    }

    relaydelay_log::init(config.logging());

    match matches.subcommand() {
        Some(("run", _)) => run(config),
        Some(("config", matches)) => manage_config(&config, matches),
        Some(("healthcheck", matches)) => healthcheck::healthcheck(&config, matches),
        _ => unreachable!(),
    }
}

/// Extracts overrides from command line arguments and their environment variables.
fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let value = |id: &str| matches.get_one::<String>(id).cloned();

    OverridableConfig {
        host: value("host"),
        port: value("port"),
        store_url: value("store_url"),
        period: value("period"),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", matches)) => show_config(config, matches),
        _ => unreachable!(),
    }
}

#[allow(clippy::print_stdout)]
pub fn show_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => println!("{config:#?}"),
        Some("yaml") | None => print!("{}", config.to_yaml_string()?),
        Some(format) => bail!("unknown config format `{format}`"),
    }

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);

    let instance = setup::instance_name();
    relaydelay_server::run(config, &instance)?;

    Ok(())
}
