use std::{env, path::PathBuf, str::FromStr, time::Duration};

use dotenv::dotenv;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub static_dir: String,
    pub cors_origin: Option<String>,

    pub supabase: SupabaseConfig,
    pub email: EmailConfig,
    pub geocoding: GeocodingConfig,
    pub image_cache: ImageCacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
    pub contact_recipient: String,
}

#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    pub nominatim_url: String,
    pub user_agent: String,
    pub min_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    pub max_size_mb: u64,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
    /// On-disk mirror; memory-only when unset.
    pub path: Option<PathBuf>,
    /// Hosts the image proxy may download from. Nothing is fetched when empty.
    pub allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            database_url: String::new(),
            database_max_connections: 10,
            run_migrations: false,
            static_dir: "../fe/dist".to_string(),
            cors_origin: None,
            supabase: SupabaseConfig {
                url: String::new(),
                anon_key: String::new(),
                service_role_key: None,
            },
            email: EmailConfig {
                api_url: "https://api.resend.com/emails".to_string(),
                api_key: None,
                from: "BookingHSE <noreply@bookinghse.com>".to_string(),
                contact_recipient: "info@bookinghse.com".to_string(),
            },
            geocoding: GeocodingConfig {
                nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
                user_agent: "BookingHSE/0.1 (info@bookinghse.com)".to_string(),
                min_interval: Duration::from_millis(1000),
            },
            image_cache: ImageCacheConfig {
                max_size_mb: 100,
                ttl: Duration::from_secs(7 * 24 * 60 * 60),
                cleanup_interval: Duration::from_secs(60 * 60),
                path: None,
                allowed_hosts: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = Self::default();
        let supabase_url = required("SUPABASE_URL")?;
        // Only our own storage unless told otherwise.
        let allowed_hosts = match optional("IMAGE_PROXY_ALLOWED_HOSTS") {
            Some(raw) => parse_hosts(&raw),
            None => host_of(&supabase_url).into_iter().collect(),
        };

        let config = Self {
            server_host: optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed("SERVER_PORT", defaults.server_port)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            run_migrations: parsed("RUN_MIGRATIONS", defaults.run_migrations)?,
            static_dir: optional("STATIC_DIR").unwrap_or(defaults.static_dir),
            cors_origin: optional("CORS_ORIGIN"),
            supabase: SupabaseConfig {
                url: supabase_url,
                anon_key: required("SUPABASE_ANON_KEY")?,
                service_role_key: optional("SUPABASE_SERVICE_ROLE_KEY"),
            },
            email: EmailConfig {
                api_url: optional("EMAIL_API_URL").unwrap_or(defaults.email.api_url),
                api_key: optional("RESEND_API_KEY"),
                from: optional("EMAIL_FROM").unwrap_or(defaults.email.from),
                contact_recipient: optional("CONTACT_RECIPIENT").unwrap_or(defaults.email.contact_recipient),
            },
            geocoding: GeocodingConfig {
                nominatim_url: optional("NOMINATIM_URL").unwrap_or(defaults.geocoding.nominatim_url),
                user_agent: optional("NOMINATIM_USER_AGENT").unwrap_or(defaults.geocoding.user_agent),
                min_interval: Duration::from_millis(parsed(
                    "NOMINATIM_MIN_INTERVAL_MS",
                    defaults.geocoding.min_interval.as_millis() as u64,
                )?),
            },
            image_cache: ImageCacheConfig {
                max_size_mb: parsed("IMAGE_CACHE_MAX_MB", defaults.image_cache.max_size_mb)?,
                ttl: Duration::from_secs(parsed("IMAGE_CACHE_TTL_SECS", defaults.image_cache.ttl.as_secs())?),
                cleanup_interval: Duration::from_secs(parsed(
                    "IMAGE_CACHE_CLEANUP_SECS",
                    defaults.image_cache.cleanup_interval.as_secs(),
                )?),
                path: optional("IMAGE_CACHE_PATH").map(PathBuf::from),
                allowed_hosts,
            },
            logging: LoggingConfig {
                level: optional("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: optional("LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_max_connections == 0 {
            return Err(AppError::Config("DATABASE_MAX_CONNECTIONS must be greater than 0".into()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if self.image_cache.max_size_mb == 0 {
            return Err(AppError::Config("IMAGE_CACHE_MAX_MB must be greater than 0".into()));
        }
        if self.image_cache.cleanup_interval.is_zero() {
            return Err(AppError::Config("IMAGE_CACHE_CLEANUP_SECS must be greater than 0".into()));
        }
        if self.geocoding.user_agent.trim().is_empty() {
            return Err(AppError::Config("NOMINATIM_USER_AGENT cannot be empty".into()));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| AppError::Config(format!("Missing environment variable '{key}'")))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {key}: {e}"))),
        None => Ok(default),
    }
}

fn parse_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .host_str()
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_address(), "127.0.0.1:8000");
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn rejects_zero_cache_size() {
        let mut config = AppConfig::default();
        config.image_cache.max_size_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn proxy_hosts_are_normalized() {
        assert_eq!(
            parse_hosts(" Abc.Supabase.co, ,cdn.example.com"),
            vec!["abc.supabase.co".to_string(), "cdn.example.com".to_string()]
        );
        assert_eq!(host_of("https://ABC.supabase.co/"), Some("abc.supabase.co".to_string()));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn loading_from_env_emits_no_events() {
        // Logging is not installed yet when configuration loads.
        for (key, value) in [
            ("DATABASE_URL", "postgres://localhost/bookinghse"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ] {
            if env::var(key).is_err() {
                env::set_var(key, value);
            }
        }

        let output = Arc::new(Mutex::new(Vec::new()));
        let writer = Captured(output.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();

        let loaded = tracing::subscriber::with_default(subscriber, AppConfig::from_env);
        assert!(loaded.is_ok());
        assert!(output.lock().is_empty());
    }

    #[derive(Clone)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut config = AppConfig::default();
        config.database_max_connections = 0;
        assert!(config.validate().is_err());
    }
}
