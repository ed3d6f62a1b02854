mod writer;

pub use writer::ReportWriter;

use std::fmt;

use crate::config::{RunConfiguration, Target};
use crate::stats::Summary;

/// The general text report: run setup, counts, latency figures.
pub struct GeneralReport<'a> {
    pub summary: &'a Summary,
    pub config: &'a RunConfiguration,
}

impl fmt::Display for GeneralReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "Stress Testing Report")?;
        writeln!(f, "Concurrency: {}", self.config.concurrency)?;
        writeln!(f, "Num CPU cores used: {}", self.config.cores)?;
        match &self.config.target {
            Target::Single(url) => writeln!(f, "URL tested: {}", url)?,
            Target::List(urls) => writeln!(f, "Total distinct URLs: {}", urls.len())?,
        }
        writeln!(f, "Server Type: {}", s.server.as_deref().unwrap_or("unknown"))?;
        writeln!(f)?;

        writeln!(f, "Total tests: {}", s.completed)?;
        writeln!(f, "Total bytes downloaded: {}", s.bytes_downloaded)?;
        writeln!(f, "Total passed: {}", s.passed)?;
        writeln!(f, "Total failed: {}", s.failed)?;
        writeln!(f, "\tFailed connections: {}", s.connection_failures)?;
        if s.other_responses > 0 {
            writeln!(f, "\tOther responses: {}", s.other_responses)?;
        }
        writeln!(f, "\t2xx responses: {}", s.resp_2xx)?;
        writeln!(f, "\t3xx responses: {}", s.resp_3xx)?;
        writeln!(f, "\t4xx responses: {}", s.resp_4xx)?;
        writeln!(f, "\t5xx responses: {}", s.resp_5xx)?;
        writeln!(f)?;

        writeln!(f, "Shortest time: {} ms", s.shortest_ms)?;
        writeln!(f, "Longest time: {} ms", s.longest_ms)?;
        writeln!(f, "Median time: {:.2} ms", s.median_ms)?;
        writeln!(f, "Average time: {:.2} ms", s.average_ms)?;
        writeln!(f, "90th percentile: {} ms", s.p90_ms)?;
        writeln!(f, "95th percentile: {} ms", s.p95_ms)?;
        writeln!(f, "99th percentile: {} ms", s.p99_ms)?;
        writeln!(f)?;

        writeln!(f, "Elapsed: {:.2} s", s.elapsed_ms as f64 / 1000.0)?;
        writeln!(f, "Requests per second: {:.2}", s.throughput)
    }
}

/// `URL,Hits` CSV, one row per url, sorted by url.
pub struct UrlHitCsv<'a>(pub &'a Summary);

impl fmt::Display for UrlHitCsv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "URL,Hits")?;
        for (url, hits) in &self.0.url_hits {
            writeln!(f, "{},{}", url, hits)?;
        }
        Ok(())
    }
}

/// Every request's latency in completion order, comma separated.
pub struct LatencyList<'a>(pub &'a Summary);

impl fmt::Display for LatencyList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ms) in self.0.raw_latencies.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", ms)?;
        }
        Ok(())
    }
}

/// What gets printed at the end of a run.
pub struct ConsoleReport<'a> {
    pub summary: &'a Summary,
    pub config: &'a RunConfiguration,
}

impl fmt::Display for ConsoleReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        writeln!(f, "-------------- Test Statistics ---------------")?;
        match &self.config.target {
            Target::Single(url) => writeln!(f, "URL requested: {}", url)?,
            Target::List(urls) => writeln!(f, "Total URL variations: {}", urls.len())?,
        }
        writeln!(f, "Num CPU cores used: {}", self.config.cores)?;
        writeln!(f, "Server type: {}", s.server.as_deref().unwrap_or("unknown"))?;
        writeln!(f, "Total tests run: {}", s.completed)?;
        if s.bytes_downloaded > 0 {
            writeln!(
                f,
                "Total bytes downloaded: {} ({} KB)",
                s.bytes_downloaded,
                s.bytes_downloaded / 1024
            )?;
        }
        writeln!(f, "Total pass: {}", s.passed)?;
        writeln!(f, "Total fail: {}", s.failed)?;
        writeln!(f, "\tTotal failed connections: {}", s.connection_failures)?;
        writeln!(f, "\tTotal responses in 2xx: {}", s.resp_2xx)?;
        writeln!(f, "\tTotal responses in 3xx: {}", s.resp_3xx)?;
        writeln!(f, "\tTotal responses in 4xx: {}", s.resp_4xx)?;
        writeln!(f, "\tTotal responses in 5xx: {}", s.resp_5xx)?;
        writeln!(f, "Shortest time: {} ms", s.shortest_ms)?;
        writeln!(f, "Longest time: {} ms", s.longest_ms)?;
        writeln!(f, "Median time: {:.2} ms", s.median_ms)?;
        writeln!(f, "Avg. time: {:.2} ms", s.average_ms)?;
        writeln!(f, "p90/p95/p99: {}/{}/{} ms", s.p90_ms, s.p95_ms, s.p99_ms)?;
        writeln!(
            f,
            "Elapsed: {:.2} s ({:.2} req/s)",
            s.elapsed_ms as f64 / 1000.0,
            s.throughput
        )?;

        if self.config.target.is_list() {
            writeln!(f, "Hits per URL:")?;
            for (url, hits) in &s.url_hits {
                writeln!(f, "\t{}: {}", url, hits)?;
            }
        }
        Ok(())
    }
}

pub fn json(summary: &Summary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}
