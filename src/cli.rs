use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    DEFAULT_CONCURRENCY, DEFAULT_DELAY, DEFAULT_TIMEOUT, DEFAULT_TOTAL, Profile, Sources,
};

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;
pub const VERSION_SUFFIX: &str = "";

/// `MAJOR.MINOR.PATCH`, with `-SUFFIX` only when a suffix is set.
pub fn version() -> String {
    let base = format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH);
    if VERSION_SUFFIX.is_empty() {
        base
    } else {
        format!("{}-{}", base, VERSION_SUFFIX)
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    about = "Fire a fixed number of HTTP requests at one or more urls and report how they went",
    disable_version_flag = true
)]
pub struct Args {
    /// The full url to test
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// File containing the list of urls to test, picked at random per request
    #[arg(short = 'l', long = "url-list")]
    pub url_list: Option<PathBuf>,

    /// Number of requests to run concurrently [default: 1]
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Total number of tests to run [default: 25]
    #[arg(short = 'm', long = "total")]
    pub total: Option<u64>,

    /// Number of processor cores to use [default: 1]
    #[arg(short = 'p', long = "cores")]
    pub cores: Option<usize>,

    /// Per-request timeout in seconds [default: 2]
    #[arg(short = 't', long = "timeout")]
    pub timeout_secs: Option<u64>,

    /// Milliseconds each worker waits between its requests, 0 for none [default: 1000]
    #[arg(long = "wait", visible_alias = "tw")]
    pub delay_ms: Option<u64>,

    /// Send POST requests with the key=value pairs in this file
    #[arg(long = "post-data", visible_alias = "pd")]
    pub post_data: Option<PathBuf>,

    /// File containing the cookies to send with every request
    #[arg(long = "cookies", visible_alias = "cf")]
    pub cookies: Option<PathBuf>,

    /// File containing user agents to pick from at random (overrides --user-agent)
    #[arg(long = "user-agents", visible_alias = "ul")]
    pub user_agents: Option<PathBuf>,

    /// User agent to send
    #[arg(long = "user-agent", visible_alias = "ua")]
    pub user_agent: Option<String>,

    /// File containing header sets to pick from at random
    #[arg(long = "header-list", visible_alias = "hl")]
    pub header_sets: Option<PathBuf>,

    /// Extra header sent with every request, as `Name: value`
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// TOML run profile; flags given here win over the profile
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Prefix of the report file names
    #[arg(long = "report-prefix", default_value = "stress_test")]
    pub report_prefix: String,

    /// Directory the report files are written to
    #[arg(long = "report-dir", default_value = ".")]
    pub report_dir: PathBuf,

    /// Do not write report files
    #[arg(long = "no-report")]
    pub no_report: bool,

    /// Print the summary as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

impl Args {
    /// Merge flags over the profile over the defaults. `None` when neither
    /// provides anything to test.
    pub fn sources(&self, profile: Profile) -> Option<Sources> {
        let url = self.url.clone().or(profile.url);
        let url_list = self.url_list.clone().or(profile.url_list);
        if url.is_none() && url_list.is_none() {
            return None;
        }

        let available = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        let cores = self.cores.or(profile.cores).unwrap_or(1).clamp(1, available);

        let mut headers: Vec<String> = profile
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        headers.extend(self.headers.iter().cloned());

        Some(Sources {
            url,
            url_list,
            concurrency: self
                .concurrency
                .or(profile.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            total: self.total.or(profile.total).unwrap_or(DEFAULT_TOTAL),
            cores,
            timeout: self
                .timeout_secs
                .or(profile.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            delay: self
                .delay_ms
                .or(profile.delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DELAY),
            post_data: self.post_data.clone().or(profile.post_data),
            cookies: self.cookies.clone().or(profile.cookies),
            user_agents: self.user_agents.clone().or(profile.user_agents),
            user_agent: self.user_agent.clone().or(profile.user_agent),
            header_sets: self.header_sets.clone().or(profile.header_sets),
            headers,
        })
    }
}
