use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix-ts>,v1=<hex-hmac-sha256>`
pub const SIGNATURE_HEADER: &str = "X-Duffel-Signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing webhook signature")]
    MissingHeader,
    #[error("malformed webhook signature header")]
    Malformed,
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("webhook signature mismatch")]
    Mismatch,
    #[error("webhook signature timestamp outside tolerance")]
    Stale,
}

/// Verifies provider webhook signatures over the raw request body
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
    tolerance_secs: Option<u64>,
}

struct ParsedHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !t.is_empty() && !signatures.is_empty() => Ok(ParsedHeader {
            timestamp: t,
            signatures,
        }),
        _ => Err(SignatureError::Malformed),
    }
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

impl SignatureVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs: None,
        }
    }

    /// Reject signatures whose timestamp is further than `secs` from now
    pub fn with_tolerance(mut self, secs: Option<u64>) -> Self {
        self.tolerance_secs = secs;
        self
    }

    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(header, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), SignatureError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;
        let parsed = parse_header(header)?;

        if let Some(tolerance) = self.tolerance_secs {
            let ts: i64 = parsed.timestamp.parse().map_err(|_| SignatureError::Malformed)?;
            if now.abs_diff(ts) > tolerance {
                return Err(SignatureError::Stale);
            }
        }

        for candidate in &parsed.signatures {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            // verify_slice compares in constant time
            if mac_for(secret, parsed.timestamp, body)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(SignatureError::Mismatch)
    }
}

/// Build a signature header value for `body`, as the provider would send it
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let ts = timestamp.to_string();
    let digest = match mac_for(secret, &ts, body) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    };
    format!("t={},v1={}", ts, digest)
}
