//! Common test utilities: descriptor fixtures and collaborator mocks

// Shared across test files, not every item is used in each one
#![allow(dead_code)]

use dragonlink_lib::device::{DeviceEnumerator, UsbDeviceDescriptor};
use dragonlink_lib::error::DlError;
use dragonlink_lib::replay::{InjectionResult, ProcessRunner, ReplayCommand};
use std::sync::Mutex;

pub fn descriptor(manufacturer: Option<&str>, product: Option<&str>, vendor_id: u16, product_id: u16) -> UsbDeviceDescriptor {
    UsbDeviceDescriptor {
        bus_number: 1,
        device_number: 4,
        vendor_id,
        product_id,
        manufacturer: manufacturer.map(str::to_owned),
        product: product.map(str::to_owned),
    }
}

pub fn generic_hub() -> UsbDeviceDescriptor {
    descriptor(Some("Generic"), Some("Hub"), 0x05e3, 0x0610)
}

pub fn dragonlink() -> UsbDeviceDescriptor {
    descriptor(Some("NXP"), Some("VCOM Port"), 0x1fc9, 0x0083)
}

/// Enumerator returning a fixed descriptor list, or an error when `fail` is set.
#[derive(Debug, Default)]
pub struct MockEnumerator {
    pub descriptors: Vec<UsbDeviceDescriptor>,
    pub fail: bool,
}

impl MockEnumerator {
    pub fn new(descriptors: Vec<UsbDeviceDescriptor>) -> Self {
        Self { descriptors, fail: false }
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn descriptors(&self) -> Result<Vec<UsbDeviceDescriptor>, DlError> {
        if self.fail {
            return Err(DlError::Enumeration(std::io::Error::other("usbfs unavailable")));
        }
        Ok(self.descriptors.clone())
    }
}

/// What the mock runner should do when called.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Exit { code: Option<i32>, stdout: String, stderr: String },
    Timeout,
    SpawnFailure,
}

/// Runner that records every command and replays a canned outcome.
#[derive(Debug)]
pub struct MockRunner {
    pub outcome: MockOutcome,
    pub calls: Mutex<Vec<ReplayCommand>>,
}

impl MockRunner {
    pub fn exiting(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::with_outcome(MockOutcome::Exit {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    pub fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ReplayCommand> {
        self.calls.lock().expect("mock runner lock poisoned").clone()
    }
}

impl ProcessRunner for MockRunner {
    async fn run(&self, command: &ReplayCommand) -> Result<InjectionResult, DlError> {
        self.calls.lock().expect("mock runner lock poisoned").push(command.clone());
        match &self.outcome {
            MockOutcome::Exit { code, stdout, stderr } => Ok(InjectionResult {
                exit_code: *code,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            }),
            MockOutcome::Timeout => Err(DlError::ReplayTimeout {
                program: command.program.clone(),
                timeout: command.timeout,
            }),
            MockOutcome::SpawnFailure => Err(DlError::ReplaySpawn {
                program: command.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}
