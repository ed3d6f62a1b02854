//! Listens for HTTP requests and samples their headers into a header-list
//! file that `volley --header-list` can play back.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{CommandFactory, Parser};
use http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, SERVER};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const SERVER_NAME: &str = "volley header recorder";

// belong to the recorded connection, not to the request being replayed
const SKIPPED_HEADERS: &[&str] = &[
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

#[derive(Debug, Parser)]
#[command(
    name = "header_recorder",
    about = "Record request headers for playback with volley --header-list",
    disable_version_flag = true
)]
struct Args {
    /// Total number of header sets to record, 1 to 100000
    #[arg(short = 't', long = "total", default_value_t = 50)]
    total: i64,

    /// Fraction of requests whose headers are recorded, in (0, 1]
    #[arg(short = 's', long = "sample-rate", default_value_t = 0.1)]
    sample_rate: f64,

    /// Address to listen on
    #[arg(short = 'a', long = "addr", default_value = "0.0.0.0:8088")]
    addr: SocketAddr,

    /// File the header sets are appended to
    #[arg(short = 'o', long = "output", default_value = "playback_headers.txt")]
    output: PathBuf,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn clamp_total(total: i64) -> usize {
    if total < 1 {
        25
    } else {
        total.min(100_000) as usize
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate <= 0.0 { 0.2 } else { rate.min(1.0) }
}

/// One header-list line: `name:value~name:value`. Connection headers and
/// values that cannot be written back in that format are left out.
fn format_header_set(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<String> = headers
        .iter()
        .filter(|(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            (!value.contains('~')).then(|| format!("{}:{}", name.as_str(), value))
        })
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("~"))
}

struct Recorder {
    total: usize,
    sample_rate: f64,
    sets: Mutex<Vec<String>>,
    done: Notify,
}

impl Recorder {
    fn new(total: usize, sample_rate: f64) -> Self {
        Self {
            total,
            sample_rate,
            sets: Mutex::new(Vec::with_capacity(total)),
            done: Notify::new(),
        }
    }

    fn offer(&self, headers: &HeaderMap) {
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        if sets.len() >= self.total || rand::random::<f64>() > self.sample_rate {
            return;
        }
        if let Some(line) = format_header_set(headers) {
            sets.push(line);
            debug!("Recorded header set {}/{}", sets.len(), self.total);
            if sets.len() == self.total {
                self.done.notify_one();
            }
        }
    }

    fn write(&self, path: &Path) -> Result<usize> {
        let sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        for line in sets.iter() {
            writeln!(file, "{}", line)?;
        }
        file.sync_all()?;
        Ok(sets.len())
    }
}

async fn respond(
    req: Request<Incoming>,
    recorder: Arc<Recorder>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let builder = Response::builder()
        .header(CACHE_CONTROL, "public, max-age=0")
        .header(CONTENT_TYPE, "text/html")
        .header(SERVER, SERVER_NAME);

    let response = if req.uri().path() == "/" {
        recorder.offer(req.headers());
        builder.body(Full::new(Bytes::new()))
    } else {
        builder
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"Invalid path")))
    };

    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

async fn serve(listener: TcpListener, recorder: Arc<Recorder>) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let recorder = recorder.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| respond(req, recorder.clone()));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(socket), service)
                .await
            {
                error!("Error handling client {}: {}", peer, e);
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args_os().len() <= 1 {
        Args::command().print_help()?;
        return Ok(());
    }
    let args = Args::parse();
    if args.version {
        println!(
            "volley header recorder - Version {}",
            env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("header_recorder=info")),
        )
        .init();

    let recorder = Arc::new(Recorder::new(
        clamp_total(args.total),
        clamp_rate(args.sample_rate),
    ));
    let listener = TcpListener::bind(args.addr).await?;
    info!(
        "Recording {} header sets at sample rate {} on {}",
        recorder.total, recorder.sample_rate, args.addr
    );

    tokio::select! {
        result = serve(listener, recorder.clone()) => result?,
        _ = recorder.done.notified() => {}
    }

    let written = recorder.write(&args.output)?;
    info!(
        "Header collection complete, {} sets written to {}",
        written,
        args.output.display()
    );
    Ok(())
}
