// Constants for the DragonLink ID replay

/// Smallest ID the receiver firmware table accepts
pub const MIN_ID: i64 = 0;

/// Largest ID the receiver firmware table accepts
pub const MAX_ID: i64 = 999;

/// Width of the code field inside the replay packet (ASCII hex characters)
pub const CODE_WIDTH: usize = 4;

/// Token in the captured packet marking the ID field
pub const DEFAULT_PLACEHOLDER: &str = "ffff";

/// USB manufacturer string reported by the DragonLink
pub const DRAGONLINK_MANUFACTURER: &str = "NXP";

/// USB product string reported by the DragonLink
pub const DRAGONLINK_PRODUCT: &str = "VCOM Port";

/// Captured packet the ID is patched into
pub const DEFAULT_TEMPLATE_FILE: &str = "base.bin";

/// Where the patched packet is written before replay
pub const DEFAULT_OUTPUT_FILE: &str = "output.txt";

/// Replay tools are named `usb_replay_<arch>`
pub const REPLAY_BINARY_PREFIX: &str = "usb_replay";

/// Upper bound on a single replay tool run, in seconds
pub const DEFAULT_REPLAY_TIMEOUT_SECS: u64 = 30;
