use crate::service::Lookups;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_host: String,
    pub gateway_port: u16,
    pub data_dir: PathBuf,
    /// Number of documents sampled per collection when inferring fields
    pub schema_sample_size: u32,
    /// Upper bound on records returned by a single table read
    pub max_records: i64,
    pub lookups: Lookups,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let gateway_host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let gateway_port = env::var("GATEWAY_PORT")
            .unwrap_or_else(|_| "9100".to_string())
            .parse()
            .unwrap_or(9100);

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let schema_sample_size = sample_size(env::var("SCHEMA_SAMPLE_SIZE").ok().as_deref());

        let max_records = env::var("MAX_RECORDS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);

        Ok(Config {
            gateway_host,
            gateway_port,
            data_dir,
            schema_sample_size,
            max_records,
            lookups: Lookups::from_env(),
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.gateway_host, self.gateway_port);
        addr.parse().map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }
}

/// `$sample` needs a positive size
fn sample_size(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(100)
        .max(1)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_host: "127.0.0.1".to_string(),
            gateway_port: 9100,
            data_dir: PathBuf::from("./data"),
            schema_sample_size: 100,
            max_records: 1000,
            lookups: Lookups::default(),
        }
    }
}
