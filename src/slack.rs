use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
/// Set by Slack when it redelivers an event it considers unacknowledged.
pub const RETRY_HEADER: &str = "X-Slack-Retry-Num";

/// Checks Slack's `v0` request signatures.
///
/// With no signing secret every request is accepted. This open mode exists for
/// local testing only and is logged loudly at startup; production deployments
/// must set `SLACK_SIGNING_SECRET`.
#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    signing_secret: Option<String>,
    max_request_age: Option<Duration>,
}

impl SignatureVerifier {
    pub fn new(signing_secret: Option<String>, max_request_age: Option<Duration>) -> Self {
        Self {
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
            max_request_age,
        }
    }

    pub fn is_open(&self) -> bool {
        self.signing_secret.is_none()
    }

    pub fn verify(&self, raw_body: &[u8], timestamp: &str, signature: &str) -> bool {
        let Some(secret) = self.signing_secret.as_deref() else {
            return true;
        };

        if let Some(max_age) = self.max_request_age {
            if !is_fresh(timestamp, max_age) {
                warn!("Rejecting request with stale or invalid timestamp: {:?}", timestamp);
                return false;
            }
        }

        match sign(secret, timestamp, raw_body) {
            Some(computed) => constant_time_eq(signature.as_bytes(), computed.as_bytes()),
            None => false,
        }
    }
}

/// Computes `v0=<hex hmac>` over `v0:{timestamp}:{body}`.
pub fn sign(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> Option<String> {
    let body_str = String::from_utf8_lossy(raw_body);
    let base_string = format!("v0:{}:{}", timestamp, body_str);

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).ok()?;
    mac.update(base_string.as_bytes());
    let result = mac.finalize();
    Some(format!("v0={}", hex::encode(result.into_bytes())))
}

fn is_fresh(timestamp: &str, max_age: Duration) -> bool {
    let Ok(ts) = timestamp.trim().parse::<u64>() else {
        return false;
    };
    let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return false;
    };
    now.as_secs().abs_diff(ts) <= max_age.as_secs()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&text=hello+world";

    fn now_secs() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    #[test]
    fn accepts_matching_signature() {
        let verifier = SignatureVerifier::new(Some(SECRET.to_string()), None);
        let signature = sign(SECRET, "1531420618", BODY).unwrap();
        assert!(verifier.verify(BODY, "1531420618", &signature));
    }

    #[test]
    fn matches_slack_documented_example() {
        let body = "token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let expected = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";

        assert_eq!(sign(SECRET, "1531420618", body.as_bytes()).as_deref(), Some(expected));

        let verifier = SignatureVerifier::new(Some(SECRET.to_string()), None);
        assert!(verifier.verify(body.as_bytes(), "1531420618", expected));
    }

    #[test]
    fn rejects_wrong_signature() {
        let verifier = SignatureVerifier::new(Some(SECRET.to_string()), None);
        let other = sign("another-secret", "1531420618", BODY).unwrap();
        assert!(!verifier.verify(BODY, "1531420618", &other));
        assert!(!verifier.verify(BODY, "1531420618", "v0=deadbeef"));
        assert!(!verifier.verify(BODY, "1531420618", ""));
    }

    #[test]
    fn rejects_tampered_body_and_timestamp() {
        let verifier = SignatureVerifier::new(Some(SECRET.to_string()), None);
        let signature = sign(SECRET, "1531420618", BODY).unwrap();
        assert!(!verifier.verify(b"text=goodbye", "1531420618", &signature));
        assert!(!verifier.verify(BODY, "1531420619", &signature));
    }

    #[test]
    fn open_mode_accepts_anything() {
        let verifier = SignatureVerifier::new(None, None);
        assert!(verifier.is_open());
        assert!(verifier.verify(BODY, "", ""));

        let empty = SignatureVerifier::new(Some(String::new()), None);
        assert!(empty.is_open());
        assert!(empty.verify(BODY, "123", "v0=nope"));
    }

    #[test]
    fn request_age_window_rejects_stale_timestamps() {
        let verifier =
            SignatureVerifier::new(Some(SECRET.to_string()), Some(Duration::from_secs(300)));

        let fresh = now_secs();
        let signature = sign(SECRET, &fresh, BODY).unwrap();
        assert!(verifier.verify(BODY, &fresh, &signature));

        let stale = sign(SECRET, "1531420618", BODY).unwrap();
        assert!(!verifier.verify(BODY, "1531420618", &stale));

        let garbage = sign(SECRET, "not-a-number", BODY).unwrap();
        assert!(!verifier.verify(BODY, "not-a-number", &garbage));
    }
}
