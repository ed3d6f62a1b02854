/// Status recorded when no response was received at all.
pub const CONNECTION_FAILED: u16 = 0;

/// Result of one request attempt. Produced once, recorded once.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// Whole milliseconds from send until the body was read; 0 when the
    /// connection failed.
    pub elapsed_ms: u64,
    pub status: u16,
    pub url: String,
    pub bytes: u64,
    /// `Server` response header, when present and non-empty.
    pub server: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    ConnectionFailed,
    /// Anything below 200 that still came back as a response.
    Other,
    Success,
    Redirection,
    ClientError,
    ServerError,
}

impl RequestOutcome {
    pub fn connection_failed(url: &str) -> Self {
        Self {
            elapsed_ms: 0,
            status: CONNECTION_FAILED,
            url: url.to_string(),
            bytes: 0,
            server: None,
        }
    }

    /// Only an exact 200 passes; a 201 or 204 is a 2xx but still a failure.
    pub fn passed(&self) -> bool {
        self.status == 200
    }

    pub fn class(&self) -> StatusClass {
        match self.status {
            CONNECTION_FAILED => StatusClass::ConnectionFailed,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500.. => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}
