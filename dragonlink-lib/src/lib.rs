pub mod capture;
pub mod constants;
pub mod device;
pub mod encoder;
pub mod error;
pub mod orchestrator;
pub mod packet;
pub mod platform;
pub mod replay;


// Re-export the pipeline entry points for easy access
pub use device::{DeviceAddress, DeviceEnumerator, DeviceSignature, NusbEnumerator, UsbDeviceDescriptor};
pub use encoder::{EncodedId, encode};
pub use error::DlError;
pub use orchestrator::{IdInjector, InjectionReport, InjectorConfig, PreparedInjection};
pub use replay::{InjectionResult, ProcessRunner, TokioProcessRunner};
