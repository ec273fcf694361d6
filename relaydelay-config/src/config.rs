use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relaydelay_log::LogConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field, either from the file or an override.
    Field(&'static str),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
            ConfigErrorSource::Field(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn invalid(field: &'static str) -> Self {
        Self::new(ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }

    /// Returns the name of the offending field, if the error is caused by a single value.
    pub fn field_name(&self) -> Option<&'static str> {
        match self.source {
            ConfigErrorSource::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Values of the configuration that can be overridden from the command line or environment.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The host the HTTP server binds to.
    pub host: Option<String>,
    /// The port the HTTP server binds to.
    pub port: Option<String>,
    /// The connection string of the telemetry store.
    pub store_url: Option<String>,
    /// The collection period in seconds.
    pub period: Option<String>,
}

/// The HTTP server exposing metrics and health checks.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Http {
    /// The host the server binds to (network interface).
    pub host: IpAddr,
    /// The port the server binds to.
    pub port: u16,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9119,
        }
    }
}

/// Pushing metrics to a Prometheus push gateway after every cycle.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct PushGateway {
    /// Enables pushing.
    pub enabled: bool,
    /// Base URL of the push gateway.
    pub addr: String,
    /// The job name used in the grouping key.
    pub job: String,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for PushGateway {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "http://127.0.0.1:9091".to_owned(),
            job: "relaydelay".to_owned(),
            timeout: 5,
        }
    }
}

/// Linear bucket layout of the delay histogram.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct HistogramBuckets {
    /// Upper bound of the first bucket.
    pub start: f64,
    /// Distance between two consecutive bucket bounds.
    pub width: f64,
    /// Number of buckets, not counting the implicit `+Inf` bucket.
    pub count: usize,
}

impl Default for HistogramBuckets {
    fn default() -> Self {
        Self {
            start: 0.0,
            width: 10.0,
            count: 20,
        }
    }
}

/// A quantile reported by the delay summary, with its tolerated rank error.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Objective {
    /// The quantile in the open interval `(0, 1)`.
    pub quantile: f64,
    /// The tolerated error in `[0, 1)`.
    pub error: f64,
}

/// Parameters of the delay summary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SummaryParams {
    /// The quantiles to report.
    pub objectives: Vec<Objective>,
    /// Number of most recent samples per label pair used to compute quantiles.
    pub window: usize,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            objectives: vec![
                Objective {
                    quantile: 0.5,
                    error: 0.05,
                },
                Objective {
                    quantile: 0.9,
                    error: 0.01,
                },
                Objective {
                    quantile: 0.99,
                    error: 0.001,
                },
            ],
            window: 1024,
        }
    }
}

/// Controls the metrics registry and its exporters.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Metrics {
    /// Serves the registry on `/metrics`.
    pub enabled: bool,
    /// Prefix of all metric names.
    pub namespace: String,
    /// Push gateway export.
    pub push_gateway: PushGateway,
    /// Delay histogram buckets.
    pub histogram: HistogramBuckets,
    /// Delay summary quantiles.
    pub summary: SummaryParams,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "relaydelay".to_owned(),
            push_gateway: PushGateway::default(),
            histogram: HistogramBuckets::default(),
            summary: SummaryParams::default(),
        }
    }
}

/// Controls the collection loop.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Collector {
    /// Seconds between two cycles, also the length of the first query window.
    period: u64,
    /// Maximum size of a decompressed telemetry blob in bytes.
    max_decoded_size: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            period: 60,
            max_decoded_size: 16 * 1024 * 1024,
        }
    }
}

/// Connection and schema of the telemetry store.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Store {
    url: String,
    database: String,
    collection: String,
    /// Field holding the encoded telemetry blob.
    blob_field: String,
    /// Field holding the insertion time in epoch milliseconds.
    time_field: String,
    /// Seconds until connecting or selecting a server times out.
    connect_timeout: u64,
    /// Retries of a failed poll before the store is marked unhealthy.
    max_retries: u32,
    retry_initial_interval: u64,
    retry_max_interval: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            url: "mongodb://127.0.0.1:27017".to_owned(),
            database: "dataAnalysis_new".to_owned(),
            collection: "report_tab".to_owned(),
            blob_field: "callGetpath".to_owned(),
            time_field: "insertTime".to_owned(),
            connect_timeout: 10,
            max_retries: 3,
            retry_initial_interval: 1,
            retry_max_interval: 30,
        }
    }
}

/// The relays whose delays are exported.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct Relays {
    /// Relay id to display address.
    nodes: BTreeMap<i64, String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigValues {
    http: Http,
    metrics: Metrics,
    collector: Collector,
    store: Store,
    relays: Relays,
    logging: LogConfig,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
#[derive(Debug)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses a config from a YAML string.
    ///
    /// The resulting config has no path. Mostly useful in tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let values = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?;

        let config = Config {
            values,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let http = &mut self.values.http;

        if let Some(host) = overrides.host {
            http.host = host
                .parse::<IpAddr>()
                .map_err(|err| ConfigError::for_field(err, "host"))?;
        }

        if let Some(port) = overrides.port {
            http.port = port
                .parse()
                .map_err(|err| ConfigError::for_field(err, "port"))?;
        }

        if let Some(store_url) = overrides.store_url {
            self.values.store.url = store_url;
        }

        if let Some(period) = overrides.period {
            self.values.collector.period = period
                .parse()
                .map_err(|err| ConfigError::for_field(err, "period"))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks the loaded values for consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        let values = &self.values;

        if values.collector.period == 0 {
            return Err(ConfigError::invalid("period"));
        }

        let histogram = &values.metrics.histogram;
        if histogram.width.is_nan() || histogram.width <= 0.0 {
            return Err(ConfigError::invalid("metrics.histogram.width"));
        }
        if histogram.count == 0 {
            return Err(ConfigError::invalid("metrics.histogram.count"));
        }
        if !histogram.start.is_finite() {
            return Err(ConfigError::invalid("metrics.histogram.start"));
        }

        let summary = &values.metrics.summary;
        for objective in &summary.objectives {
            let quantile_valid = objective.quantile > 0.0 && objective.quantile < 1.0;
            let error_valid = (0.0..1.0).contains(&objective.error);
            if !quantile_valid || !error_valid {
                return Err(ConfigError::invalid("metrics.summary.objectives"));
            }
        }
        if summary.window == 0 {
            return Err(ConfigError::invalid("metrics.summary.window"));
        }

        if values.metrics.namespace.is_empty() {
            return Err(ConfigError::invalid("metrics.namespace"));
        }

        let push_gateway = &values.metrics.push_gateway;
        if push_gateway.enabled && push_gateway.addr.is_empty() {
            return Err(ConfigError::invalid("metrics.push_gateway.addr"));
        }

        if values.store.url.is_empty() {
            return Err(ConfigError::invalid("store.url"));
        }
        if values.store.database.is_empty() {
            return Err(ConfigError::invalid("store.database"));
        }
        if values.store.collection.is_empty() {
            return Err(ConfigError::invalid("store.collection"));
        }

        if values.relays.nodes.values().any(|addr| addr.trim().is_empty()) {
            return Err(ConfigError::invalid("relays.nodes"));
        }

        Ok(())
    }

    /// Serializes the effective configuration, including defaults, to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// The config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the socket address the HTTP server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.values.http.host, self.values.http.port)
    }

    /// Returns `true` if the registry is served on `/metrics`.
    pub fn metrics_enabled(&self) -> bool {
        self.values.metrics.enabled
    }

    /// Returns the prefix of all metric names.
    pub fn metrics_namespace(&self) -> &str {
        &self.values.metrics.namespace
    }

    /// Returns the push gateway settings.
    pub fn push_gateway(&self) -> &PushGateway {
        &self.values.metrics.push_gateway
    }

    /// Returns the request timeout for pushing metrics.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.values.metrics.push_gateway.timeout)
    }

    /// Returns the delay histogram bucket layout.
    pub fn histogram_buckets(&self) -> HistogramBuckets {
        self.values.metrics.histogram
    }

    /// Returns the delay summary parameters.
    pub fn summary_params(&self) -> &SummaryParams {
        &self.values.metrics.summary
    }

    /// Returns the time between two collection cycles.
    ///
    /// This is also the length of the very first query window.
    pub fn collection_period(&self) -> Duration {
        Duration::from_secs(self.values.collector.period)
    }

    /// Returns the maximum size of a decompressed telemetry blob.
    pub fn max_decoded_size(&self) -> usize {
        self.values.collector.max_decoded_size
    }

    /// Returns the connection string of the telemetry store.
    pub fn store_url(&self) -> &str {
        &self.values.store.url
    }

    /// Returns the database holding telemetry records.
    pub fn store_database(&self) -> &str {
        &self.values.store.database
    }

    /// Returns the collection holding telemetry records.
    pub fn store_collection(&self) -> &str {
        &self.values.store.collection
    }

    /// Returns the name of the field holding the encoded blob.
    pub fn store_blob_field(&self) -> &str {
        &self.values.store.blob_field
    }

    /// Returns the name of the field holding the insertion time.
    pub fn store_time_field(&self) -> &str {
        &self.values.store.time_field
    }

    /// Returns the timeout for connecting to the store.
    pub fn store_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.values.store.connect_timeout)
    }

    /// Returns how often a failed poll is retried within one cycle.
    pub fn store_max_retries(&self) -> u32 {
        self.values.store.max_retries
    }

    /// Returns the first delay between poll retries.
    pub fn store_retry_initial_interval(&self) -> Duration {
        Duration::from_secs(self.values.store.retry_initial_interval)
    }

    /// Returns the upper bound of the delay between poll retries.
    pub fn store_retry_max_interval(&self) -> Duration {
        Duration::from_secs(self.values.store.retry_max_interval)
    }

    /// Returns the configured relays as a map from relay id to display address.
    pub fn relay_nodes(&self) -> &BTreeMap<i64, String> {
        &self.values.relays.nodes
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use relaydelay_log::{Level, LogFormat};
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:9119".parse().unwrap());
        assert!(config.metrics_enabled());
        assert_eq!(config.metrics_namespace(), "relaydelay");
        assert!(!config.push_gateway().enabled);
        assert_eq!(config.collection_period(), Duration::from_secs(60));
        assert_eq!(config.max_decoded_size(), 16_777_216);
        assert_eq!(config.store_database(), "dataAnalysis_new");
        assert_eq!(config.store_collection(), "report_tab");
        assert_eq!(config.store_blob_field(), "callGetpath");
        assert_eq!(config.store_time_field(), "insertTime");
        assert_eq!(config.summary_params().objectives.len(), 3);
        assert!(config.relay_nodes().is_empty());
        assert_eq!(config.logging().level, Level::Info);
    }

    #[test]
    fn test_parse_full() {
        let yaml = r#"
http:
  host: 0.0.0.0
  port: 8080
metrics:
  namespace: proxy
  push_gateway:
    enabled: true
    addr: http://pushgateway:9091
  histogram: { start: 5.0, width: 2.5, count: 4 }
  summary:
    objectives: [{quantile: 0.5, error: 0.05}]
    window: 16
collector:
  period: 30
relays:
  nodes:
    1: 10.0.0.1
    7: 10.0.0.7
logging:
  level: debug
  format: json
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.metrics_namespace(), "proxy");
        assert_eq!(config.push_gateway().addr, "http://pushgateway:9091");
        assert_eq!(config.push_gateway().job, "relaydelay");
        assert_eq!(
            config.histogram_buckets(),
            HistogramBuckets {
                start: 5.0,
                width: 2.5,
                count: 4
            }
        );
        assert_eq!(config.summary_params().window, 16);
        assert_eq!(config.collection_period(), Duration::from_secs(30));
        assert_eq!(
            config.relay_nodes().get(&7).map(String::as_str),
            Some("10.0.0.7")
        );
        assert_eq!(config.logging().format, LogFormat::Json);
    }

    #[test]
    fn test_zero_period_invalid() {
        let err = Config::from_yaml_str("collector: { period: 0 }").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(err.to_string(), "invalid config value (field period)");
    }

    #[test]
    fn test_invalid_histogram() {
        let err = Config::from_yaml_str("metrics: { histogram: { width: 0 } }").unwrap_err();
        assert_eq!(err.field_name(), Some("metrics.histogram.width"));

        let err = Config::from_yaml_str("metrics: { histogram: { count: 0 } }").unwrap_err();
        assert_eq!(err.field_name(), Some("metrics.histogram.count"));
    }

    #[test]
    fn test_invalid_objectives() {
        let yaml = "metrics: { summary: { objectives: [{quantile: 1.0, error: 0.01}] } }";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.field_name(), Some("metrics.summary.objectives"));

        let yaml = "metrics: { summary: { objectives: [{quantile: 0.5, error: 1.0}] } }";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert_eq!(err.field_name(), Some("metrics.summary.objectives"));
    }

    #[test]
    fn test_empty_relay_address() {
        let err = Config::from_yaml_str("relays: { nodes: { 3: '' } }").unwrap_err();
        assert_eq!(err.field_name(), Some("relays.nodes"));
    }

    #[test]
    fn test_bad_yaml() {
        let err = Config::from_yaml_str("http: [").unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::BadYaml);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_yaml_str("{}").unwrap();

        config
            .apply_override(OverridableConfig {
                host: Some("0.0.0.0".to_owned()),
                port: Some("9000".to_owned()),
                store_url: Some("mongodb://db:27017".to_owned()),
                period: Some("15".to_owned()),
            })
            .unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.store_url(), "mongodb://db:27017");
        assert_eq!(config.collection_period(), Duration::from_secs(15));
    }

    #[test]
    fn test_apply_override_invalid() {
        let mut config = Config::from_yaml_str("{}").unwrap();

        let err = config
            .apply_override(OverridableConfig {
                port: Some("not a port".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field_name(), Some("port"));

        let err = config
            .apply_override(OverridableConfig {
                period: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid config value (field period)");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        writeln!(file, "relays:\n  nodes:\n    1: 10.0.0.1").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.path(), dir.path());
        assert_eq!(config.relay_nodes().len(), 1);
    }

    #[test]
    fn test_from_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_path(dir.path()).unwrap_err();

        assert_eq!(err.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(err.to_string().starts_with("could not open config file (file "));
    }

    #[test]
    fn test_to_yaml_string() {
        let config = Config::from_yaml_str("relays: { nodes: { 1: 10.0.0.1 } }").unwrap();
        let yaml = config.to_yaml_string().unwrap();

        insta::assert_snapshot!(yaml, @r#"
        http:
          host: 127.0.0.1
          port: 9119
        metrics:
          enabled: true
          namespace: relaydelay
          push_gateway:
            enabled: false
            addr: http://127.0.0.1:9091
            job: relaydelay
            timeout: 5
          histogram:
            start: 0.0
            width: 10.0
            count: 20
          summary:
            objectives:
            - quantile: 0.5
              error: 0.05
            - quantile: 0.9
              error: 0.01
            - quantile: 0.99
              error: 0.001
            window: 1024
        collector:
          period: 60
          max_decoded_size: 16777216
        store:
          url: mongodb://127.0.0.1:27017
          database: dataAnalysis_new
          collection: report_tab
          blob_field: callGetpath
          time_field: insertTime
          connect_timeout: 10
          max_retries: 3
          retry_initial_interval: 1
          retry_max_interval: 30
        relays:
          nodes:
            1: 10.0.0.1
        logging:
          level: info
          format: auto
          enable_backtraces: false
        "#);
    }
}
