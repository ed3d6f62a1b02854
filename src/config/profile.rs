use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Optional TOML run profile. Every field mirrors a command-line flag; flags
/// given on the command line take precedence.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub url: Option<String>,
    pub url_list: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub total: Option<u64>,
    pub cores: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub delay_ms: Option<u64>,
    pub post_data: Option<PathBuf>,
    pub cookies: Option<PathBuf>,
    pub user_agents: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub header_sets: Option<PathBuf>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Profile {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: Profile = toml::from_str(&content)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_profile() {
        let profile: Profile = toml::from_str(
            r#"
            url = "http://localhost:3000/"
            concurrency = 8
            total = 200

            [headers]
            Accept = "text/html"
            "#,
        )
        .unwrap();

        assert_eq!(profile.url.as_deref(), Some("http://localhost:3000/"));
        assert_eq!(profile.concurrency, Some(8));
        assert_eq!(profile.total, Some(200));
        assert_eq!(profile.timeout_secs, None);
        assert_eq!(profile.headers.get("Accept").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<Profile>("bogus = 1").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "total = 5\ndelay_ms = 250").unwrap();

        let profile = Profile::from_file(file.path()).unwrap();
        assert_eq!(profile.total, Some(5));
        assert_eq!(profile.delay_ms, Some(250));
    }
}
