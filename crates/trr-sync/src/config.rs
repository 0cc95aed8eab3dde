//! Runtime configuration for the sync boundary. `trr-cli`'s `serve`
//! subcommand builds one of these from clap/env and hands it to
//! [`crate::server::SyncServer::new`]; the sync crate itself stays free of
//! a CLI dependency so it can be embedded by other front-ends.

use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub staging_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    /// HMAC secret for bearer tokens. Generated randomly at first start if
    /// `TRRCMS_AUTH_SECRET` is unset (spec.md §4.6 "A rotating server-side
    /// secret is generated at first start if not provided").
    pub auth_secret: Vec<u8>,
    /// Maximum accepted upload body size in bytes (spec.md §4.6: 100 MiB).
    pub max_upload_bytes: usize,
    /// Auto-register unknown devices on `/auth` (spec.md §4.6 default
    /// policy; an operator can disable this to require pre-registration).
    pub auto_register_devices: bool,
}

pub const DEFAULT_PORT: u16 = 5890;
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

impl SyncConfig {
    pub fn new(staging_dir: impl Into<PathBuf>, quarantine_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "0.0.0.0".parse().unwrap(),
            port: DEFAULT_PORT,
            staging_dir: staging_dir.into(),
            quarantine_dir: quarantine_dir.into(),
            auth_secret: random_secret(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            auto_register_devices: true,
        }
    }
}

/// 32 random bytes, used when no operator-supplied secret is available.
pub fn random_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
