use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `dragonlink-lib` library.
#[derive(Error, Debug)]
pub enum DlError {
    #[error(
        "USB device not found: no device with manufacturer {manufacturer:?} and product {product:?} among {scanned} scanned. Is the DragonLink connected?"
    )]
    DeviceNotFound {
        manufacturer: String,
        product: String,
        scanned: usize,
    },

    #[error("ID {id} is out of range, supported IDs are 0..=999")]
    EncodingRange { id: i64 },

    #[error("Unsupported platform: os={os}, arch={arch} (supported: linux on x86_64 or aarch64)")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Invalid placeholder: {0}")]
    InvalidPlaceholder(String),

    #[error("Invalid device address {0:?}, expected vvvv:pppp")]
    InvalidAddress(String),

    #[error("Failed to read packet template {path:?}: {source}")]
    TemplateRead { path: PathBuf, source: io::Error },

    #[error("Failed to write patched packet {path:?}: {source}")]
    OutputWrite { path: PathBuf, source: io::Error },

    #[error("USB enumeration error: {0}")]
    Enumeration(#[from] nusb::Error),

    #[error("Failed to spawn replay tool {program:?}: {source}")]
    ReplaySpawn { program: PathBuf, source: io::Error },

    #[error("Replay tool {program:?} did not exit within {timeout:?}")]
    ReplayTimeout { program: PathBuf, timeout: Duration },

    #[error(
        "Replay of ID {id} to {address} failed with exit code {}: {stderr}",
        describe_exit(.exit_code)
    )]
    ReplayFailed {
        id: i64,
        address: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Capture parse error at line {line}: {message}")]
    CaptureParse { line: usize, message: String },
}

/// Renders a child exit code, `None` meaning the child was killed by a signal.
pub fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "<terminated by signal>".to_string(),
    }
}
