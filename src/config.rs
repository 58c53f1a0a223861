use crate::error::{Error, Result};
use crate::types::lookup_type_by_name;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 25052;

/// Default accept backlog
pub const DEFAULT_BACKLOG: u32 = 32;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address; the IPv6 wildcard also accepts IPv4 clients
    pub bind_addr: IpAddr,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Listen backlog
    pub backlog: u32,

    /// Upper bound on how long one poll may block
    pub poll_timeout_ms: u64,

    /// Maximum number of connected clients
    pub max_clients: usize,

    /// Size of the buffer used for a single client read
    pub read_buffer_size: usize,

    /// Stop reading from a client while this many bytes wait to be written
    pub write_high_water: usize,

    /// How long a closing client may take to flush its output
    pub drain_timeout_ms: u64,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Close each client after its first serviced read
    pub close_after_service: bool,

    /// Log level
    pub log_level: String,

    /// Variables defined at startup
    pub variables: Vec<VariableConfig>,
}

/// A variable to define when the server starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            poll_timeout_ms: 1000,
            max_clients: 1024,
            read_buffer_size: 4096,
            write_high_water: 256 * 1024,
            drain_timeout_ms: 5000,
            tcp_nodelay: true,
            close_after_service: true,
            log_level: "info".to_string(),
            variables: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use varsvr::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_file("varsvr.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 || i32::try_from(self.backlog).is_err() {
            return Err(invalid(format!(
                "backlog must be between 1 and {}",
                i32::MAX
            )));
        }

        if self.max_clients == 0 {
            return Err(invalid("max_clients must be > 0"));
        }

        if self.poll_timeout_ms == 0 {
            return Err(invalid("poll_timeout_ms must be > 0"));
        }

        if self.read_buffer_size < 64 {
            return Err(invalid("read_buffer_size must be >= 64"));
        }

        if self.write_high_water < self.read_buffer_size {
            return Err(invalid("write_high_water must be >= read_buffer_size"));
        }

        for var in &self.variables {
            match lookup_type_by_name(&var.type_name) {
                Some(desc) if !desc.is_null() => {}
                _ => {
                    return Err(invalid(format!(
                        "variable '{}' has unusable type '{}'",
                        var.name, var.type_name
                    )))
                }
            }
        }

        Ok(())
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(msg.into())
}
