use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the message broker and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the address the server binds to and how many calls it serves at once.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

/// Configuration settings for the broker.
///
/// `message_ttl_secs` applies to every tag. `eviction_interval_secs` is the
/// period of the background retention sweep; `0` disables it.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub message_ttl_secs: u64,
    pub eviction_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub message_ttl_secs: Option<u64>,
    pub eviction_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Fill every missing value in `partial` from `Settings::default()`.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.as_ref();
        let broker = partial.broker.as_ref();

        Settings {
            server: ServerSettings {
                host: server
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server.and_then(|s| s.port).unwrap_or(default.server.port),
                max_connections: server
                    .and_then(|s| s.max_connections)
                    .unwrap_or(default.server.max_connections),
            },
            broker: BrokerSettings {
                message_ttl_secs: broker
                    .and_then(|b| b.message_ttl_secs)
                    .unwrap_or(default.broker.message_ttl_secs),
                eviction_interval_secs: broker
                    .and_then(|b| b.eviction_interval_secs)
                    .unwrap_or(default.broker.eviction_interval_secs),
            },
            log: LogSettings {
                level: partial
                    .log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 50051,
                max_connections: 1000,
            },
            broker: BrokerSettings {
                message_ttl_secs: 3600,
                eviction_interval_secs: 60,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
