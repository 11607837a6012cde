use crate::Error;
use std::time::Duration;

/// Settings of a connection to the remote SQL engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the workspace, like `https://example.cloud.databricks.com`.
    pub host: url::Url,
    /// ID of the SQL warehouse which executes statements.
    pub warehouse_id: String,
    /// Time for which a statement submission blocks server-side before
    /// returning a pending statement to be polled.
    pub wait_timeout: Duration,
    /// Interval between polls of a pending statement.
    pub poll_interval: Duration,
}

impl Settings {
    /// Build Settings from a server hostname and the HTTP path of a SQL endpoint.
    pub fn new(server_hostname: &str, http_path: &str) -> Result<Self, Error> {
        Ok(Self {
            host: host_url(server_hostname)?,
            warehouse_id: warehouse_id(http_path)?,
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// The wait timeout, formatted as the API expects. The API accepts only
    /// zero, or between five and fifty seconds.
    pub(crate) fn wait_timeout_param(&self) -> String {
        let secs = self.wait_timeout.as_secs();
        let secs = if secs == 0 { 0 } else { secs.clamp(5, 50) };
        format!("{secs}s")
    }
}

fn host_url(server_hostname: &str) -> Result<url::Url, Error> {
    let server_hostname = server_hostname.trim().trim_end_matches('/');
    if server_hostname.is_empty() {
        return Err(Error::Config("server hostname is empty".to_string()));
    }

    let raw = if server_hostname.contains("://") {
        server_hostname.to_string()
    } else {
        format!("https://{server_hostname}")
    };
    let url = url::Url::parse(&raw)
        .map_err(|err| Error::Config(format!("invalid server hostname {server_hostname:?}: {err}")))?;

    if url.host_str().is_none() || url.path() != "/" {
        return Err(Error::Config(format!(
            "server hostname {server_hostname:?} must be a bare host"
        )));
    }
    Ok(url)
}

// Extracts the warehouse ID from a path like `/sql/1.0/warehouses/<id>`.
// The older `/sql/1.0/endpoints/<id>` form is also accepted.
fn warehouse_id(http_path: &str) -> Result<String, Error> {
    let segments: Vec<&str> = http_path
        .trim()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [.., "warehouses" | "endpoints", id] => Ok(id.to_string()),
        _ => Err(Error::Config(format!(
            "SQL endpoint path {http_path:?} must look like /sql/1.0/warehouses/<id>"
        ))),
    }
}

/// Volume is a durable storage location in which uploads are staged,
/// like `/Volumes/<catalog>/<schema>/<volume>`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Volume(String);

impl Volume {
    pub fn parse(path: &str) -> Result<Self, Error> {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();

        let valid = matches!(segments.as_slice(), ["", "Volumes", rest @ ..] if rest.len() >= 3)
            && segments[2..].iter().all(|s| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });

        if !valid {
            return Err(Error::Config(format!(
                "volume {path:?} must look like /Volumes/<catalog>/<schema>/<volume>"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Path of the file `name` within this volume.
    pub fn file(&self, name: &str) -> String {
        format!("{}/{name}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Volume {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Volume::parse(&value)
    }
}

impl From<Volume> for String {
    fn from(value: Volume) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settings_from_parts() {
        let settings =
            Settings::new("dbc-1234.cloud.databricks.com", "/sql/1.0/warehouses/abc123").unwrap();
        assert_eq!(settings.host.as_str(), "https://dbc-1234.cloud.databricks.com/");
        assert_eq!(settings.warehouse_id, "abc123");
        assert_eq!(settings.wait_timeout_param(), "30s");

        let settings = Settings::new("http://127.0.0.1:8080/", "sql/1.0/endpoints/xyz/").unwrap();
        assert_eq!(settings.host.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(settings.warehouse_id, "xyz");
    }

    #[test]
    fn test_settings_errors() {
        for (host, path) in [
            ("", "/sql/1.0/warehouses/abc"),
            ("host.example.com/some/path", "/sql/1.0/warehouses/abc"),
            ("host.example.com", "/sql/1.0/warehouses"),
            ("host.example.com", "/sql/1.0/clusters/abc"),
            ("host.example.com", ""),
        ] {
            let err = Settings::new(host, path).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{host} {path}: {err}");
        }
    }

    #[test]
    fn test_wait_timeout_is_clamped() {
        let mut settings = Settings::new("h.example.com", "/sql/1.0/warehouses/a").unwrap();
        settings.wait_timeout = Duration::from_secs(2);
        assert_eq!(settings.wait_timeout_param(), "5s");
        settings.wait_timeout = Duration::from_secs(120);
        assert_eq!(settings.wait_timeout_param(), "50s");
        settings.wait_timeout = Duration::ZERO;
        assert_eq!(settings.wait_timeout_param(), "0s");
    }

    #[test]
    fn test_volume() {
        let volume = Volume::parse("/Volumes/main/tmp/uploads/").unwrap();
        assert_eq!(volume.as_str(), "/Volumes/main/tmp/uploads");
        assert_eq!(
            volume.file("user_upload_0a1b2c3d.csv"),
            "/Volumes/main/tmp/uploads/user_upload_0a1b2c3d.csv"
        );

        for bad in [
            "",
            "/dbfs/tmp",
            "/Volumes/main/tmp",
            "Volumes/main/tmp/uploads",
            "/Volumes/main//uploads",
            "/Volumes/main/tmp/up loads",
        ] {
            assert!(Volume::parse(bad).is_err(), "{bad}");
        }
    }
}
