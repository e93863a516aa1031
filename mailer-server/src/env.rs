use lettre::Address;
use mailer_common::email::senders::RelayTls;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

const ENV_VAR: &str = "ENV";
const DEV_ENV: &str = "dev";

const HOST_VAR: &str = "HOST";
const PORT_VAR: &str = "PORT";

const EMAIL_FROM_VAR: &str = "EMAIL_FROM";
const EMAIL_PASSWORD_VAR: &str = "EMAIL_PASSWORD";
const EMAIL_RECIPIENT_VAR: &str = "EMAIL_RECIPIENT";
const EMAIL_SUBJECT_VAR: &str = "EMAIL_SUBJECT";
const EMAIL_ENABLED_VAR: &str = "EMAIL_ENABLED";

const SMTP_HOST_VAR: &str = "SMTP_HOST";
const SMTP_PORT_VAR: &str = "SMTP_PORT";
const SMTP_TLS_VAR: &str = "SMTP_TLS";

const CORS_ALLOWED_ORIGINS_VAR: &str = "CORS_ALLOWED_ORIGINS";
const ACTIX_WORKER_COUNT_VAR: &str = "ACTIX_WORKER_COUNT";
const LIMITER_WARN_EVERY_OVER_LIMIT_VAR: &str = "LIMITER_WARN_EVERY_OVER_LIMIT";

const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
const LOG_DIR_VAR: &str = "LOG_DIR";

/// Process-wide settings. Built once at startup and handed to whatever needs them; nothing
/// reads the environment after this has been constructed.
pub struct Config {
    pub host: String,
    pub port: u16,

    pub email_from_address: Address,
    pub email_password: Zeroizing<String>,
    pub default_recipients: Vec<Address>,
    /// Complete header line, e.g. `Subject: Contact form\n`
    pub default_subject: String,
    pub email_enabled: bool,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_tls: RelayTls,

    pub cors_allowed_origins: Vec<String>,
    pub actix_worker_count: usize,
    pub limiter_warn_every_over_limit: u32,

    pub log_level: String,
    pub log_dir: Option<String>,
}

impl Config {
    /// Reads the process environment. `port_override` takes precedence over `PORT`.
    pub fn from_env(port_override: Option<u16>) -> Result<Config, ConfigError> {
        Self::from_vars(|key| {
            if key == PORT_VAR {
                if let Some(port) = port_override {
                    return Some(port.to_string());
                }
            }

            std::env::var(key).ok()
        })
    }

    pub fn from_vars<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let email_password: String = env_var(&lookup, EMAIL_PASSWORD_VAR)?;
        if email_password.is_empty() {
            return Err(ConfigError::invalid(EMAIL_PASSWORD_VAR));
        }

        let smtp_host: String = env_var(&lookup, SMTP_HOST_VAR)?;
        if smtp_host.trim().is_empty() {
            return Err(ConfigError::invalid(SMTP_HOST_VAR));
        }

        let default_recipients = env_var_or(&lookup, EMAIL_RECIPIENT_VAR, String::new());
        let default_recipients = split_list(&default_recipients)
            .map(|addr| addr.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::invalid(EMAIL_RECIPIENT_VAR))?;

        let email_enabled = match lookup(EMAIL_ENABLED_VAR) {
            Some(flag) => match flag.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => return Err(ConfigError::invalid(EMAIL_ENABLED_VAR)),
            },
            None => true,
        };

        let actix_worker_count =
            optional_env_var(&lookup, ACTIX_WORKER_COUNT_VAR)?.unwrap_or_else(num_cpus::get);
        if actix_worker_count == 0 {
            return Err(ConfigError::invalid(ACTIX_WORKER_COUNT_VAR));
        }

        let cors_allowed_origins = env_var_or(&lookup, CORS_ALLOWED_ORIGINS_VAR, String::from("*"));
        let cors_allowed_origins = split_list(&cors_allowed_origins)
            .map(String::from)
            .collect();

        Ok(Config {
            host: env_var_or(&lookup, HOST_VAR, String::from("0.0.0.0")),
            port: env_var(&lookup, PORT_VAR)?,

            email_from_address: env_var(&lookup, EMAIL_FROM_VAR)?,
            email_password: Zeroizing::new(email_password),
            default_recipients,
            default_subject: env_var_or(&lookup, EMAIL_SUBJECT_VAR, String::new()),
            email_enabled,

            smtp_host,
            smtp_port: env_var(&lookup, SMTP_PORT_VAR)?,
            smtp_tls: match lookup(SMTP_TLS_VAR) {
                Some(mode) => mode
                    .parse()
                    .map_err(|_| ConfigError::invalid(SMTP_TLS_VAR))?,
                None => RelayTls::default(),
            },

            cors_allowed_origins,
            actix_worker_count,
            limiter_warn_every_over_limit: optional_env_var(
                &lookup,
                LIMITER_WARN_EVERY_OVER_LIMIT_VAR,
            )?
            .unwrap_or(0),

            log_level: env_var_or(&lookup, LOG_LEVEL_VAR, String::from("info")),
            log_dir: lookup(LOG_DIR_VAR).filter(|dir| !dir.is_empty()),
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads `env_file_path` into the process environment when `ENV=dev`. Variables that are
/// already set keep their values. Returns whether a file was loaded.
pub fn load_dotenv_if_dev(env_file_path: &str) -> Result<bool, dotenvy::Error> {
    if std::env::var(ENV_VAR).as_deref() != Ok(DEV_ENV) {
        return Ok(false);
    }

    dotenvy::from_path(env_file_path)?;
    Ok(true)
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn env_var<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let var = lookup(key).ok_or(ConfigError::missing(key))?;
    let var: T = var.trim().parse().map_err(|_| ConfigError::invalid(key))?;
    Ok(var)
}

/// Like `env_var()`, but an absent variable is `None` rather than an error. A variable that is
/// present must still parse.
fn optional_env_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(var) => {
            let var: T = var.trim().parse().map_err(|_| ConfigError::invalid(key))?;
            Ok(Some(var))
        }
        None => Ok(None),
    }
}

fn env_var_or<F, T>(lookup: &F, key: &'static str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(var) = lookup(key) else {
        return default;
    };

    var.parse().unwrap_or(default)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str),
}

impl ConfigError {
    fn missing(var_name: &'static str) -> Self {
        Self::MissingVar(var_name)
    }

    fn invalid(var_name: &'static str) -> Self {
        Self::InvalidVar(var_name)
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(key) => write!(f, "Missing environment variable '{}'", key),
            Self::InvalidVar(key) => write!(f, "Environment variable '{}' is invalid", key),
        }
    }
}
