use crate::origin::Origin;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "proxy.toml";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_ROUTE: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no origin configured; pass --origin or set upstream.origin")]
    MissingOrigin,
    #[error("invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
    #[error("unsupported origin scheme {0:?}; only http is supported")]
    UnsupportedScheme(String),
    #[error("cleanup interval must be greater than zero")]
    ZeroInterval,
    #[error("route {0:?} must start with '/'")]
    InvalidRoute(String),
}

/// Caching forward proxy with a time-based response cache.
#[derive(Parser, Debug, Default)]
#[command(name = "proxy-server", version)]
pub struct Args {
    /// Port to listen on [default: 8080]
    #[arg(long)]
    pub port: Option<u16>,

    /// Origin base URL that requests are forwarded to
    #[arg(long)]
    pub origin: Option<String>,

    /// How long a cached response is kept, e.g. "30s" or "2m" [default: 30s]
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cache_ttl: Option<Duration>,

    /// How often expired entries are purged [default: 10s]
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cleanup_interval: Option<Duration>,

    /// Path to proxy. "/" proxies every path [default: /]
    #[arg(long)]
    pub route: Option<String>,

    /// Treat expired entries as misses even before they are purged
    #[arg(long)]
    pub strict_expiry: bool,

    /// TOML config file [default: ./proxy.toml if present]
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// On-disk config. Every field is optional; flags override it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub route: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub cleanup_interval: Option<Duration>,
    pub strict_expiry: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub origin: Origin,
    pub cache_ttl: Duration,
    pub cleanup_interval: Duration,
    pub route: String,
    pub strict_expiry: bool,
}

impl Settings {
    /// Resolve settings from flags and the config file they point to.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                let file = FileConfig::load(path)?;
                tracing::info!(path = %path.display(), "loaded config file");
                file
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                let file = FileConfig::load(Path::new(DEFAULT_CONFIG_FILE))?;
                tracing::info!(path = DEFAULT_CONFIG_FILE, "loaded config file");
                file
            }
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Flags win over the file, the file wins over defaults.
    pub fn merge(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let raw_origin = args
            .origin
            .as_deref()
            .or(file.upstream.origin.as_deref())
            .filter(|o| !o.trim().is_empty())
            .ok_or(ConfigError::MissingOrigin)?;
        let origin = Origin::parse(raw_origin.trim())?;

        let cleanup_interval = args
            .cleanup_interval
            .or(file.cache.cleanup_interval)
            .unwrap_or(DEFAULT_CLEANUP_INTERVAL);
        if cleanup_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        let route = args
            .route
            .clone()
            .or(file.server.route)
            .unwrap_or_else(|| DEFAULT_ROUTE.to_string());
        if !route.starts_with('/') {
            return Err(ConfigError::InvalidRoute(route));
        }

        Ok(Settings {
            port: args.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            origin,
            cache_ttl: args.cache_ttl.or(file.cache.ttl).unwrap_or(DEFAULT_CACHE_TTL),
            cleanup_interval,
            route,
            strict_expiry: args.strict_expiry || file.cache.strict_expiry.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["proxy-server"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_with_origin_only() {
        let s = Settings::merge(&args(&["--origin", "http://localhost:9001"]), FileConfig::default())
            .unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.origin.as_str(), "http://localhost:9001");
        assert_eq!(s.cache_ttl, Duration::from_secs(30));
        assert_eq!(s.cleanup_interval, Duration::from_secs(10));
        assert_eq!(s.route, "/");
        assert!(!s.strict_expiry);
    }

    #[test]
    fn flags_parse_durations() {
        let a = args(&[
            "--origin",
            "http://localhost:9001",
            "--port",
            "9000",
            "--cache-ttl",
            "2s",
            "--cleanup-interval",
            "500ms",
            "--route",
            "/projects",
            "--strict-expiry",
        ]);
        let s = Settings::merge(&a, FileConfig::default()).unwrap();
        assert_eq!(s.port, 9000);
        assert_eq!(s.cache_ttl, Duration::from_secs(2));
        assert_eq!(s.cleanup_interval, Duration::from_millis(500));
        assert_eq!(s.route, "/projects");
        assert!(s.strict_expiry);
    }

    #[test]
    fn bad_duration_flag_is_rejected() {
        let res = Args::try_parse_from(["proxy-server", "--cache-ttl", "soon"]);
        assert!(res.is_err());
    }

    #[test]
    fn missing_origin_is_fatal() {
        let err = Settings::merge(&Args::default(), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOrigin));

        let err = Settings::merge(&args(&["--origin", ""]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOrigin));
    }

    #[test]
    fn unparsable_origin_is_fatal() {
        let err = Settings::merge(&args(&["--origin", "::nope"]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOrigin { .. }));
    }

    #[test]
    fn zero_cleanup_interval_is_rejected() {
        let a = args(&["--origin", "http://o", "--cleanup-interval", "0s"]);
        assert!(matches!(
            Settings::merge(&a, FileConfig::default()),
            Err(ConfigError::ZeroInterval)
        ));
    }

    #[test]
    fn route_must_be_absolute() {
        let a = args(&["--origin", "http://o", "--route", "projects"]);
        assert!(matches!(
            Settings::merge(&a, FileConfig::default()),
            Err(ConfigError::InvalidRoute(_))
        ));
    }

    #[test]
    fn file_values_apply_and_flags_override() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 7000
            route = "/projects"

            [upstream]
            origin = "http://file-origin:9001/"

            [cache]
            ttl = "1m"
            cleanup_interval = "5s"
            strict_expiry = true
            "#,
        )
        .unwrap();

        let s = Settings::merge(&Args::default(), file.clone()).unwrap();
        assert_eq!(s.port, 7000);
        assert_eq!(s.origin.as_str(), "http://file-origin:9001");
        assert_eq!(s.cache_ttl, Duration::from_secs(60));
        assert_eq!(s.cleanup_interval, Duration::from_secs(5));
        assert_eq!(s.route, "/projects");
        assert!(s.strict_expiry);

        let a = args(&["--origin", "http://flag-origin", "--port", "8081", "--cache-ttl", "3s"]);
        let s = Settings::merge(&a, file).unwrap();
        assert_eq!(s.port, 8081);
        assert_eq!(s.origin.as_str(), "http://flag-origin");
        assert_eq!(s.cache_ttl, Duration::from_secs(3));
        assert_eq!(s.cleanup_interval, Duration::from_secs(5));
    }

    #[test]
    fn load_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[upstream]\norigin = \"http://localhost:9001\"").unwrap();

        let a = Args {
            config: Some(f.path().to_path_buf()),
            ..Args::default()
        };
        let s = Settings::resolve(&a).unwrap();
        assert_eq!(s.origin.as_str(), "http://localhost:9001");
    }

    #[test]
    fn explicit_missing_file_is_fatal() {
        let a = Args {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..Args::default()
        };
        assert!(matches!(Settings::resolve(&a), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn unknown_keys_are_a_parse_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[cache]\ncapacity = 10").unwrap();
        assert!(matches!(
            FileConfig::load(f.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
