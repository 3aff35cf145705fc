//! The ID injection pipeline.
//!
//! Stages run strictly in order and the first failure aborts the rest:
//! platform check, device discovery, encoding, packet patching, replay.
//! Nothing is retried and the patched packet is left on disk whatever
//! happens after it is written.

use crate::constants::{
    DEFAULT_OUTPUT_FILE, DEFAULT_PLACEHOLDER, DEFAULT_REPLAY_TIMEOUT_SECS, DEFAULT_TEMPLATE_FILE,
};
use crate::device::{DeviceAddress, DeviceEnumerator, DeviceSignature, locate};
use crate::encoder::{EncodedId, encode};
use crate::error::DlError;
use crate::packet::PacketTemplate;
use crate::platform::Platform;
use crate::replay::{InjectionResult, ProcessRunner, ReplayInvoker};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct InjectorConfig {
    pub template_path: PathBuf,
    pub output_path: PathBuf,
    pub placeholder: String,
    pub signature: DeviceSignature,
    /// Skip discovery and use this address
    pub address: Option<DeviceAddress>,
    /// Directory holding the per-architecture replay tools
    pub tool_dir: PathBuf,
    /// Use this replay tool instead of the per-architecture one
    pub binary: Option<PathBuf>,
    /// Wrapper command line such as `["sudo", "-n"]` to run the replay tool through
    pub elevate: Option<Vec<String>>,
    pub timeout: Duration,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE_FILE),
            output_path: PathBuf::from(DEFAULT_OUTPUT_FILE),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            signature: DeviceSignature::dragonlink(),
            address: None,
            tool_dir: PathBuf::from("."),
            binary: None,
            elevate: None,
            timeout: Duration::from_secs(DEFAULT_REPLAY_TIMEOUT_SECS),
        }
    }
}

/// A patched packet on disk, ready to be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInjection {
    pub id: i64,
    pub code: EncodedId,
    pub padded_code: String,
    pub address: DeviceAddress,
    pub binary: PathBuf,
    pub output_path: PathBuf,
    pub substitutions: usize,
}

/// Outcome of a successful injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    pub prepared: PreparedInjection,
    pub result: InjectionResult,
}

pub struct IdInjector<E, R> {
    enumerator: E,
    invoker: ReplayInvoker<R>,
    platform: Platform,
    config: InjectorConfig,
}

impl<E: DeviceEnumerator, R: ProcessRunner> IdInjector<E, R> {
    pub fn new(enumerator: E, runner: R, config: InjectorConfig) -> Self {
        let invoker = ReplayInvoker::new(runner)
            .with_elevate(config.elevate.clone())
            .with_timeout(config.timeout);
        Self {
            enumerator,
            invoker,
            platform: Platform::current(),
            config,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub fn invoker(&self) -> &ReplayInvoker<R> {
        &self.invoker
    }

    /// Run every stage up to and including writing the patched packet.
    pub fn prepare(&self, id: i64) -> Result<PreparedInjection, DlError> {
        let arch = self.platform.check()?;
        let binary = match &self.config.binary {
            Some(binary) => binary.clone(),
            None => self.config.tool_dir.join(arch.replay_binary_name()),
        };

        let address = match self.config.address {
            Some(address) => {
                info!("Using configured device address {}", address);
                address
            }
            None => {
                info!("Searching for {} device...", self.config.signature);
                let descriptors = self.enumerator.descriptors()?;
                locate(&descriptors, &self.config.signature)?
            }
        };
        info!("Device address: {}", address);

        let code = encode(id)?;
        info!("Encoded ID {} as {:?}", id, code.as_str());

        let template = PacketTemplate::load(&self.config.template_path)?;
        let patched = template.patch(&self.config.placeholder, code.as_str())?;
        patched.write_to(&self.config.output_path)?;

        Ok(PreparedInjection {
            id,
            code,
            padded_code: patched.code,
            address,
            binary,
            output_path: self.config.output_path.clone(),
            substitutions: patched.substitutions,
        })
    }

    /// Prepare the packet and replay it to the device.
    pub async fn run(&self, id: i64) -> Result<InjectionReport, DlError> {
        let prepared = self.prepare(id)?;
        let result = self
            .invoker
            .invoke(&prepared.address, &prepared.output_path, &prepared.binary)
            .await?;

        if !result.success() {
            error!(
                "Replay tool failed for ID {} on {} (exit code {:?})",
                id, prepared.address, result.exit_code
            );
            return Err(DlError::ReplayFailed {
                id,
                address: prepared.address.to_string(),
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        info!("Injected ID [{}] to {} DragonLink", id, prepared.address);
        Ok(InjectionReport { prepared, result })
    }
}
