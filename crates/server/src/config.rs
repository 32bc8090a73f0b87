use std::{
    env,
    net::{IpAddr, SocketAddr},
};

use anyhow::Context;
use db::DEFAULT_DATABASE_URL;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    /// Created or promoted to staff at startup.
    pub bootstrap_admin_email: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host
            .parse()
            .with_context(|| format!("HOST '{host}' is not an IP address"))?;
        let port = match non_empty("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT '{port}' is not a port number"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host,
            port,
            bootstrap_admin_email: non_empty("BOOTSTRAP_ADMIN_EMAIL"),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let parsed = config(&[("PORT", " ")]).unwrap();
        assert_eq!(parsed.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(parsed.addr().to_string(), "127.0.0.1:3001");
        assert_eq!(parsed.bootstrap_admin_email, None);
    }

    #[test]
    fn values_are_parsed() {
        let parsed = config(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("BOOTSTRAP_ADMIN_EMAIL", "root@example.com"),
        ])
        .unwrap();
        assert_eq!(parsed.addr().to_string(), "0.0.0.0:8080");
        assert_eq!(parsed.bootstrap_admin_email.as_deref(), Some("root@example.com"));

        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("HOST", "localhost")]).is_err());
    }
}
