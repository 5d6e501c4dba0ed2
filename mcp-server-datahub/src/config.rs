use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_GMS_URL: &str = "http://localhost:8080";
pub const CONFIG_FILE_NAME: &str = ".datahubenv";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the client identifies itself to GMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    Sdk,
    Cli,
    Ingestion,
}

impl ClientMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientMode::Sdk => "SDK",
            ClientMode::Cli => "CLI",
            ClientMode::Ingestion => "INGESTION",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Url,
    pub token: Option<String>,
    pub client_mode: ClientMode,
    pub component: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid DataHub server URL '{value}': {source}")]
    InvalidServerUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("invalid DATAHUB_GMS_PORT '{0}'")]
    InvalidPort(String),
    #[error("unable to read {path}: {source}")]
    ReadConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    InvalidConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct DatahubEnvFile {
    #[serde(default)]
    gms: Option<GmsSection>,
}

#[derive(Debug, Default, Deserialize)]
struct GmsSection {
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl ClientConfig {
    pub fn from_env(
        client_mode: ClientMode,
        component: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = default_config_path();
        Self::from_lookup(
            |name| std::env::var(name).ok(),
            config_path.as_deref(),
            client_mode,
            component,
        )
    }

    /// Resolves the GMS endpoint from explicit variables first, then the
    /// `.datahubenv` file, then the local default.
    pub fn from_lookup<F>(
        mut lookup: F,
        config_path: Option<&Path>,
        client_mode: ClientMode,
        component: impl Into<String>,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let file = match config_path {
            Some(path) => read_config_file(path)?,
            None => None,
        };
        let file_gms = file.and_then(|file| file.gms).unwrap_or_default();

        let server = if let Some(url) = lookup("DATAHUB_GMS_URL") {
            url
        } else if let Some(host) = lookup("DATAHUB_GMS_HOST") {
            let protocol = lookup("DATAHUB_GMS_PROTOCOL").unwrap_or_else(|| "http".to_string());
            match lookup("DATAHUB_GMS_PORT") {
                Some(port) => {
                    let port: u16 = port
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
                    format!("{protocol}://{host}:{port}")
                }
                None => format!("{protocol}://{host}"),
            }
        } else if let Some(server) = file_gms.server.filter(|value| !value.trim().is_empty()) {
            server
        } else {
            tracing::warn!(
                default = DEFAULT_GMS_URL,
                "no DataHub server configured, falling back to default"
            );
            DEFAULT_GMS_URL.to_string()
        };

        let token = lookup("DATAHUB_GMS_TOKEN")
            .or(file_gms.token)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        Ok(Self {
            server: parse_server_url(&server)?,
            token,
            client_mode,
            component: component.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn graphql_endpoint(&self) -> Url {
        let base = self.server.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/api/graphql")).unwrap_or_else(|_| self.server.clone())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

fn read_config_file(path: &Path) -> Result<Option<DatahubEnvFile>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::ReadConfigFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::InvalidConfigFile {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_server_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidServerUrl {
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::NamedTempFile;

    fn resolve(
        vars: &[(&str, &str)],
        config_path: Option<&Path>,
    ) -> Result<ClientConfig, ConfigError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ClientConfig::from_lookup(
            |name| vars.get(name).cloned(),
            config_path,
            ClientMode::Sdk,
            "mcp-server-datahub/test",
        )
    }

    fn write_config_file(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().expect("temp config file");
        std::fs::write(file.path(), contents).expect("write config file");
        file
    }

    #[test]
    fn gms_url_takes_precedence() {
        let file = write_config_file("gms:\n  server: http://from-file:8080\n");
        let config = resolve(
            &[
                ("DATAHUB_GMS_URL", "https://datahub.example.com/gms"),
                ("DATAHUB_GMS_HOST", "ignored"),
            ],
            Some(file.path()),
        )
        .expect("config");

        assert_eq!(config.server.as_str(), "https://datahub.example.com/gms");
        assert_eq!(
            config.graphql_endpoint().as_str(),
            "https://datahub.example.com/gms/api/graphql"
        );
        assert_eq!(config.component, "mcp-server-datahub/test");
        assert_eq!(config.client_mode, ClientMode::Sdk);
    }

    #[test]
    fn host_port_and_protocol_are_combined() {
        let config = resolve(
            &[
                ("DATAHUB_GMS_HOST", "gms.internal"),
                ("DATAHUB_GMS_PORT", "9002"),
                ("DATAHUB_GMS_PROTOCOL", "https"),
            ],
            None,
        )
        .expect("config");

        assert_eq!(config.server.as_str(), "https://gms.internal:9002/");
        assert_eq!(
            config.graphql_endpoint().as_str(),
            "https://gms.internal:9002/api/graphql"
        );
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = resolve(
            &[("DATAHUB_GMS_HOST", "gms"), ("DATAHUB_GMS_PORT", "eighty")],
            None,
        )
        .expect_err("invalid port should fail");
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }

    #[test]
    fn config_file_supplies_server_and_token() {
        let file = write_config_file("gms:\n  server: http://from-file:8080\n  token: file-token\n");
        let config = resolve(&[], Some(file.path())).expect("config");

        assert_eq!(config.server.as_str(), "http://from-file:8080/");
        assert_eq!(config.token.as_deref(), Some("file-token"));
    }

    #[test]
    fn env_token_overrides_file_and_blank_token_is_absent() {
        let file = write_config_file("gms:\n  server: http://from-file:8080\n  token: file-token\n");
        let config = resolve(&[("DATAHUB_GMS_TOKEN", "env-token")], Some(file.path()))
            .expect("config");
        assert_eq!(config.token.as_deref(), Some("env-token"));

        let config = resolve(&[("DATAHUB_GMS_URL", "http://gms:8080")], None).expect("config");
        assert_eq!(config.token, None);

        let config = resolve(
            &[("DATAHUB_GMS_URL", "http://gms:8080"), ("DATAHUB_GMS_TOKEN", "  ")],
            None,
        )
        .expect("config");
        assert_eq!(config.token, None);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = resolve(&[], Some(&dir.path().join(CONFIG_FILE_NAME))).expect("config");
        assert_eq!(config.server.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn invalid_yaml_and_url_are_reported() {
        let file = write_config_file("gms: [not, a, mapping\n");
        let err = resolve(&[], Some(file.path())).expect_err("invalid yaml should fail");
        assert!(matches!(err, ConfigError::InvalidConfigFile { .. }));

        let err = resolve(&[("DATAHUB_GMS_URL", "not a url")], None)
            .expect_err("invalid url should fail");
        assert!(err.to_string().contains("not a url"));
    }
}
