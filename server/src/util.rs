use chrono::{DateTime, Duration, Utc};

const EXPIRY_MARGIN_SECS: i64 = 30;

pub fn check_expired(expires_at: DateTime<Utc>) -> bool {
    let now_with_margin = Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS);
    now_with_margin > expires_at
}

/// First and last few characters of a secret, for logs
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 20 {
        return "***".to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}

/// ISO 8601 with a trailing `Z`, the format every timestamp leaves the server in
pub fn to_iso_z(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
