mod cookie;
mod profile;

pub use cookie::Cookie;
pub use profile::Profile;

use http::header::{HeaderName, HeaderValue};
use rand::seq::IndexedRandom;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::loader;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 volley";
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_TOTAL: u64 = 25;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// One set of headers sent together on a request.
pub type HeaderSet = Vec<(String, String)>;

// connection-level headers and headers the client derives from the request
const UNREPLAYABLE_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Whether a header from a header set can be sent as is.
pub fn replayable_header(name: &str) -> bool {
    !UNREPLAYABLE_HEADERS
        .iter()
        .any(|header| name.eq_ignore_ascii_case(header))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no target url given")]
    NoTarget,
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported scheme in `{0}`, only http:// targets can be tested")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Single(String),
    List(Vec<String>),
}

impl Target {
    /// Pick the url for the next request, uniformly at random for a list.
    pub fn pick(&self) -> &str {
        match self {
            Target::Single(url) => url,
            Target::List(urls) => urls
                .choose(&mut rand::rng())
                .map(String::as_str)
                .unwrap_or_default(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Target::List(_))
    }
}

/// Everything a run needs, built once and shared read-only with every worker.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub target: Target,
    pub user_agent: String,
    pub user_agents: Vec<String>,
    pub headers: HeaderSet,
    pub header_sets: Vec<HeaderSet>,
    pub cookies: Vec<Cookie>,
    pub post_data: Vec<(String, String)>,
    pub timeout: Duration,
    pub delay: Duration,
    pub total: u64,
    pub concurrency: usize,
    pub cores: usize,
}

impl RunConfiguration {
    /// Defaults for everything but the target, with no pause between requests.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            user_agents: Vec::new(),
            headers: Vec::new(),
            header_sets: Vec::new(),
            cookies: Vec::new(),
            post_data: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            total: DEFAULT_TOTAL,
            concurrency: DEFAULT_CONCURRENCY,
            cores: 1,
        }
    }

    /// POST whenever there is a body to send, GET otherwise.
    pub fn method(&self) -> Method {
        if self.post_data.is_empty() {
            Method::Get
        } else {
            Method::Post
        }
    }

    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .unwrap_or(&self.user_agent)
    }

    pub fn pick_header_set(&self) -> Option<&HeaderSet> {
        self.header_sets.choose(&mut rand::rng())
    }

    /// Value for the `Cookie` header, if any cookies are configured.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.cookies.iter().map(Cookie::pair).collect();
        Some(pairs.join("; "))
    }

    pub fn form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.post_data.iter())
            .finish()
    }

    /// Workers that can do useful work: never more than the budget, never zero.
    pub fn worker_count(&self) -> usize {
        let budget = usize::try_from(self.total).unwrap_or(usize::MAX);
        self.concurrency.max(1).min(budget.max(1))
    }

    /// Build the configuration from resolved sources, loading every auxiliary
    /// file. A file that fails to load is reported and replaced by its default.
    pub fn load(sources: Sources) -> Result<Self, ConfigError> {
        let target = load_target(&sources)?;
        let mut config = RunConfiguration::new(target);

        config.concurrency = sources.concurrency;
        config.total = sources.total;
        config.cores = sources.cores;
        config.timeout = sources.timeout;
        config.delay = sources.delay;
        if let Some(user_agent) = sources.user_agent {
            config.user_agent = user_agent;
        }

        config.headers = sources
            .headers
            .iter()
            .filter_map(|line| match line.split_once(':') {
                Some((name, value)) => Some((name.trim().to_string(), value.trim().to_string())),
                None => {
                    warn!("Ignoring header `{}`, expected `Name: value`", line);
                    None
                }
            })
            .filter(|(name, value)| valid_header(name, value))
            .collect();

        if let Some(path) = &sources.post_data {
            match loader::load_post_data(path) {
                Ok(pairs) if !pairs.is_empty() => {
                    info!("Loaded {} post data fields, using POST", pairs.len());
                    config.post_data = pairs;
                }
                Ok(_) => warn!(
                    "Post data file {} has no data, falling back to GET",
                    path.display()
                ),
                Err(e) => warn!("{}, falling back to GET", e),
            }
        }

        if let Some(path) = &sources.cookies {
            match loader::load_cookies(path) {
                Ok(cookies) => config.cookies = cookies,
                Err(e) => warn!("{}, sending no cookies", e),
            }
        }

        if let Some(path) = &sources.user_agents {
            match loader::load_lines(path) {
                Ok(agents) => config.user_agents = agents,
                Err(e) => warn!("{}, using user agent `{}`", e, config.user_agent),
            }
        }

        if let Some(path) = &sources.header_sets {
            match loader::load_header_sets(path) {
                Ok(sets) => {
                    config.header_sets = sets
                        .into_iter()
                        .map(|set| {
                            set.into_iter()
                                .filter(|(name, value)| valid_header(name, value))
                                .collect::<HeaderSet>()
                        })
                        .filter(|set| !set.is_empty())
                        .collect()
                }
                Err(e) => warn!("{}, sending no extra header sets", e),
            }
        }

        Ok(config)
    }
}

/// Raw inputs for a run, already merged from command line, profile and defaults.
#[derive(Debug, Clone)]
pub struct Sources {
    pub url: Option<String>,
    pub url_list: Option<PathBuf>,
    pub concurrency: usize,
    pub total: u64,
    pub cores: usize,
    pub timeout: Duration,
    pub delay: Duration,
    pub post_data: Option<PathBuf>,
    pub cookies: Option<PathBuf>,
    pub user_agents: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub header_sets: Option<PathBuf>,
    pub headers: Vec<String>,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            url: None,
            url_list: None,
            concurrency: DEFAULT_CONCURRENCY,
            total: DEFAULT_TOTAL,
            cores: 1,
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            post_data: None,
            cookies: None,
            user_agents: None,
            user_agent: None,
            header_sets: None,
            headers: Vec::new(),
        }
    }
}

fn load_target(sources: &Sources) -> Result<Target, ConfigError> {
    if let Some(path) = &sources.url_list {
        match loader::load_lines(path) {
            Ok(lines) => {
                let urls: Vec<String> = lines
                    .into_iter()
                    .filter(|url| match check_url(url) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Dropping {} from url list: {}", url, e);
                            false
                        }
                    })
                    .collect();
                if !urls.is_empty() {
                    info!("Running tests on {} different urls randomly", urls.len());
                    return Ok(Target::List(urls));
                }
                warn!("Url list {} has no usable urls", path.display());
            }
            Err(e) => warn!("{}", e),
        }
    }

    let url = sources.url.clone().ok_or(ConfigError::NoTarget)?;
    check_url(&url)?;
    info!("Running tests on {}", url);
    Ok(Target::Single(url))
}

fn check_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }
    Ok(())
}

fn valid_header(name: &str, value: &str) -> bool {
    let ok = HeaderName::from_bytes(name.as_bytes()).is_ok() && HeaderValue::from_str(value).is_ok();
    if !ok {
        warn!("Ignoring invalid header `{}: {}`", name, value);
    }
    ok
}
