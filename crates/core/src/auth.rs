//! Bearer-token auth gate for the control protocol: HTTP
//! `Authorization: Bearer <key>` or the WebSocket subprotocol
//! `dominds-auth.<key>`. The raw token is only ever compared, never
//! logged; comparison hashes both sides first so length differences
//! can't leak through timing, then compares the digests with
//! [`subtle::ConstantTimeEq`].

use rand::Rng as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const WS_SUBPROTOCOL_PREFIX: &str = "dominds-auth.";

/// WebSocket close code for an auth rejection.
pub const WS_CLOSE_UNAUTHORIZED: u16 = 4401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Dev,
    Prod,
}

/// The resolved auth posture for this process: either every request is
/// let through, or a key is required and compared constant-time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthGate {
    Disabled,
    Enabled { key: String },
}

impl AuthGate {
    /// `env_value`: the configured key, if any (`Some("")` explicitly
    /// disables auth regardless of mode). `dev` mode always disables auth.
    /// `prod` mode with no configured key generates one.
    pub fn resolve(mode: RunMode, env_value: Option<&str>) -> Self {
        if mode == RunMode::Dev {
            return AuthGate::Disabled;
        }
        match env_value {
            Some("") => AuthGate::Disabled,
            Some(key) => AuthGate::Enabled { key: key.to_string() },
            None => AuthGate::Enabled {
                key: generate_key(),
            },
        }
    }

    pub fn verify(&self, provided: &str) -> bool {
        match self {
            AuthGate::Disabled => true,
            AuthGate::Enabled { key } => constant_time_eq(key, provided),
        }
    }
}

fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let expected_digest = Sha256::digest(expected.as_bytes());
    let provided_digest = Sha256::digest(provided.as_bytes());
    expected_digest.ct_eq(&provided_digest).into()
}

/// A 32-character key drawn from the RFC-7230 `tchar` alphabet, so it is
/// safe to carry verbatim in both an `Authorization` header value and a
/// WebSocket subprotocol token.
fn generate_key() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

/// RFC 7230 `tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" /
/// "." / "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA`. A key with any
/// other byte cannot safely round-trip through a header or subprotocol
/// token.
pub fn is_tchar_safe(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    key.bytes().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'!' | b'#'
                    | b'$'
                    | b'%'
                    | b'&'
                    | b'\''
                    | b'*'
                    | b'+'
                    | b'-'
                    | b'.'
                    | b'^'
                    | b'_'
                    | b'`'
                    | b'|'
                    | b'~'
            )
    })
}

/// Extracts the bearer key from an `Authorization: Bearer <key>` header
/// value.
pub fn extract_bearer_header(value: &str) -> Option<&str> {
    value.strip_prefix("Bearer ")
}

/// Extracts the key from a `dominds-auth.<key>` WebSocket subprotocol
/// token.
pub fn extract_ws_subprotocol(value: &str) -> Option<&str> {
    value.strip_prefix(WS_SUBPROTOCOL_PREFIX)
}
