use crate::constants::REPLAY_BINARY_PREFIX;
use crate::error::DlError;
use strum_macros::Display;
use tracing::info;

/// CPU architectures a replay tool build exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Arch {
    #[strum(to_string = "x86_64")]
    X86_64,
    #[strum(to_string = "aarch64")]
    Aarch64,
}

impl Arch {
    pub fn from_machine(machine: &str) -> Option<Self> {
        match machine {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            _ => None,
        }
    }

    /// File name of the replay tool built for this architecture.
    pub fn replay_binary_name(&self) -> String {
        format!("{}_{}", REPLAY_BINARY_PREFIX, self)
    }
}

/// The OS and machine the tool is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Only Linux on x86_64 or aarch64 has a replay tool.
    pub fn check(&self) -> Result<Arch, DlError> {
        info!("Checking platform: os={} arch={}", self.os, self.arch);
        let unsupported = || DlError::UnsupportedPlatform {
            os: self.os.clone(),
            arch: self.arch.clone(),
        };
        if !self.os.eq_ignore_ascii_case("linux") {
            return Err(unsupported());
        }
        let arch = Arch::from_machine(&self.arch).ok_or_else(unsupported)?;
        info!("Running on supported OS and architecture.");
        Ok(arch)
    }
}
