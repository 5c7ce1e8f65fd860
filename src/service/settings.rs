//! Service settings resolution
//!
//! Turns the raw, partially specified `config` block of a service into a
//! normalized [`ServiceConfig`]. Everything here is pure so the precedence
//! rules can be exercised without a live connection.

use crate::error::{GatewayError, Result};
use crate::service::Lookups;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

pub const DRIVER_NAME: &str = "mongodb";
pub const DSN_PREFIX: &str = "mongodb://";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;

/// Settings for one service as stored or submitted by an administrator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSettings {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Value,
}

impl RawSettings {
    pub fn from_config(config: Value) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }
}

/// The `config` block after lookup substitution
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dsn: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    driver_options: Option<Value>,
}

/// TLS parameters recovered from a stream-context style descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsContext {
    pub allow_invalid_certificates: bool,
    pub allow_invalid_hostnames: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_key_file: Option<PathBuf>,
}

/// Driver-native connection context built from `driver_options.context`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverContext {
    pub tls: Option<TlsContext>,
}

impl DriverContext {
    /// Materialize a raw descriptor such as
    /// `{"ssl": {"allow_self_signed": true, "cafile": "/etc/ca.pem"}}`.
    pub fn from_descriptor(service: &str, descriptor: &Value) -> Result<Self> {
        let map = descriptor.as_object().ok_or_else(|| GatewayError::Configuration {
            service: service.to_string(),
            message: "driver_options.context must be a mapping".to_string(),
        })?;

        let mut context = DriverContext::default();

        for (key, params) in map {
            match key.as_str() {
                "ssl" | "tls" => {
                    context.tls = Some(TlsContext::from_params(service, params)?);
                }
                other => debug!("Ignoring unsupported context option '{}' for {}", other, service),
            }
        }

        Ok(context)
    }
}

impl TlsContext {
    fn from_params(service: &str, params: &Value) -> Result<Self> {
        let map = params.as_object().ok_or_else(|| GatewayError::Configuration {
            service: service.to_string(),
            message: "driver_options.context.ssl must be a mapping".to_string(),
        })?;

        let flag = |name: &str| map.get(name).and_then(value_as_bool);
        let path = |name: &str| {
            map.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };

        let allow_self_signed = flag("allow_self_signed").unwrap_or(false);
        let verify_peer = flag("verify_peer").unwrap_or(true);
        let verify_peer_name = flag("verify_peer_name").unwrap_or(true);

        Ok(TlsContext {
            allow_invalid_certificates: allow_self_signed || !verify_peer,
            allow_invalid_hostnames: !verify_peer_name,
            ca_file: path("cafile").or_else(|| path("ca_file")),
            cert_key_file: path("local_cert").or_else(|| path("cert_key_file")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverOptions {
    pub context: Option<DriverContext>,
    /// Remaining driver options, passed through untouched
    pub extra: Map<String, Value>,
}

/// Normalized connection configuration; immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub driver: &'static str,
    pub dsn: String,
    pub database: String,
    pub options: Map<String, Value>,
    pub driver_options: DriverOptions,
}

impl ServiceConfig {
    /// Apply lookups to the raw settings and resolve them into a config.
    pub fn resolve(service: &str, settings: &RawSettings, lookups: &Lookups) -> Result<Self> {
        let mut config = match &settings.config {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        lookups.replace_in(&mut config);

        let raw: RawConfig =
            serde_json::from_value(config).map_err(|e| GatewayError::Configuration {
                service: service.to_string(),
                message: format!("Invalid service configuration: {}", e),
            })?;

        Self::from_raw(service, raw)
    }

    fn from_raw(service: &str, raw: RawConfig) -> Result<Self> {
        let dsn = match raw.dsn.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(dsn) => normalize_dsn(dsn),
            None => build_dsn(
                raw.host.as_deref(),
                raw.port.as_ref().and_then(value_as_port),
                raw.username.as_deref(),
                raw.password.as_deref(),
            ),
        };

        // An empty or non-mapping value is treated as absent
        let options = match raw.options {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let database = resolve_database(raw.database.as_deref(), &options, &dsn)
            .ok_or_else(|| GatewayError::no_database(service))?;

        let mut driver_options = DriverOptions::default();
        if let Some(Value::Object(mut map)) = raw.driver_options {
            if let Some(descriptor) = map.remove("context") {
                if !descriptor.is_null() {
                    driver_options.context = Some(DriverContext::from_descriptor(service, &descriptor)?);
                }
            }
            driver_options.extra = map;
        }

        Ok(ServiceConfig {
            driver: DRIVER_NAME,
            dsn,
            database,
            options,
            driver_options,
        })
    }

    /// The URI handed to the driver: the DSN with `options` appended as
    /// query parameters. `db` and `database` only select the database.
    pub fn connection_uri(&self) -> String {
        let params: Vec<String> = self
            .options
            .iter()
            .filter(|(key, _)| key.as_str() != "db" && key.as_str() != "database")
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some(format!("{}={}", urlencoding::encode(key), urlencoding::encode(&value)))
            })
            .collect();

        if params.is_empty() {
            return self.dsn.clone();
        }

        let mut uri = self.dsn.clone();
        if uri.contains('?') {
            if !uri.ends_with('?') && !uri.ends_with('&') {
                uri.push('&');
            }
        } else {
            if !uri[DSN_PREFIX.len()..].contains('/') {
                uri.push('/');
            }
            uri.push('?');
        }
        uri.push_str(&params.join("&"));
        uri
    }

    /// DSN with any password masked, for logs
    pub fn redacted_dsn(&self) -> String {
        let rest = &self.dsn[DSN_PREFIX.len()..];
        match (rest.find('@'), rest.find(':')) {
            (Some(at), Some(colon)) if colon < at => {
                format!("{}{}:****{}", DSN_PREFIX, &rest[..colon], &rest[at..])
            }
            _ => self.dsn.clone(),
        }
    }
}

/// Ensure the DSN carries the canonical scheme prefix exactly once.
pub fn normalize_dsn(dsn: &str) -> String {
    match dsn.get(..DSN_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(DSN_PREFIX) => {
            format!("{}{}", DSN_PREFIX, &dsn[DSN_PREFIX.len()..])
        }
        _ => format!("{}{}", DSN_PREFIX, dsn),
    }
}

/// Database named in the first path segment of a normalized DSN
pub fn database_from_dsn(dsn: &str) -> String {
    let rest = dsn.get(DSN_PREFIX.len()..).unwrap_or_default();

    let path = match rest.find('/') {
        Some(pos) => &rest[pos..],
        None => return String::new(),
    };
    let path = match path.find('?') {
        Some(pos) => &path[..pos],
        None => path,
    };
    let db = path.trim_matches('/');

    urlencoding::decode(db)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| db.to_string())
}

/// First non-empty of: explicit field, `options.db`, `options.database`,
/// the DSN path.
pub fn resolve_database(
    explicit: Option<&str>,
    options: &Map<String, Value>,
    dsn: &str,
) -> Option<String> {
    let option = |key: &str| options.get(key).and_then(Value::as_str);

    [explicit, option("db"), option("database")]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|db| !db.is_empty())
        .map(str::to_string)
        .or_else(|| Some(database_from_dsn(dsn)).filter(|db| !db.is_empty()))
}

fn build_dsn(
    host: Option<&str>,
    port: Option<u16>,
    username: Option<&str>,
    password: Option<&str>,
) -> String {
    let host = host.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_HOST);
    let port = port.filter(|p| *p > 0).unwrap_or(DEFAULT_PORT);

    let mut dsn = String::from(DSN_PREFIX);

    if let Some(user) = username.filter(|s| !s.is_empty()) {
        dsn.push_str(&urlencoding::encode(user));
        if let Some(pass) = password.filter(|s| !s.is_empty()) {
            dsn.push(':');
            dsn.push_str(&urlencoding::encode(pass));
        }
        dsn.push('@');
    }

    dsn.push_str(host);
    dsn.push(':');
    dsn.push_str(&port.to_string());
    dsn
}

fn value_as_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
