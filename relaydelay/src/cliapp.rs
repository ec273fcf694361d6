//! This module implements the definition of the command line app.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Exports relay link delays from client telemetry as Prometheus metrics.";

pub fn make_app() -> Command {
    Command::new("relaydelay")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("RELAYDELAY_CONFIG")
                .default_value(".relaydelay")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the collector")
                .after_help(
                    "This runs the collector in the foreground until it's shut down. It \
                     polls the telemetry store periodically and serves metrics and health \
                     checks on the configured interface.",
                )
                .arg(
                    Arg::new("host")
                        .value_name("HOST")
                        .long("host")
                        .short('H')
                        .env("RELAYDELAY_HOST")
                        .help("The host address the HTTP server binds to."),
                )
                .arg(
                    Arg::new("port")
                        .value_name("PORT")
                        .long("port")
                        .short('P')
                        .env("RELAYDELAY_PORT")
                        .help("The port the HTTP server binds to."),
                )
                .arg(
                    Arg::new("store_url")
                        .value_name("URL")
                        .long("store-url")
                        .env("RELAYDELAY_STORE_URL")
                        .help("The connection string of the telemetry store."),
                )
                .arg(
                    Arg::new("period")
                        .value_name("SECONDS")
                        .long("period")
                        .env("RELAYDELAY_PERIOD")
                        .help("The collection period in seconds."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the relaydelay config")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which \
                             are not in the config file but filled in from defaults. The \
                             default output format is YAML but a debug format can also be \
                             specified.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode a single telemetry blob")
                .after_help(
                    "This decodes a stored telemetry blob and prints the plaintext document \
                     along with the delays extracted from it as JSON. The blob is read from \
                     the given file, or from stdin if no file is given. No config is needed.",
                )
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("The file containing the blob."),
                )
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Pretty print the output."),
                ),
        )
        .subcommand(
            Command::new("healthcheck")
                .about("Check the health of a running collector")
                .after_help(
                    "This queries the health endpoint of a running collector and exits with \
                     a non-zero status code if it is unhealthy or unreachable.",
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .short('m')
                        .value_parser(["live", "ready"])
                        .default_value("ready")
                        .help("The health check to perform."),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u64))
                        .default_value("10")
                        .help("The request timeout in seconds."),
                )
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .value_name("ADDR")
                        .value_parser(value_parser!(SocketAddr))
                        .help("The address to check. Defaults to the configured listen address."),
                ),
        )
}
