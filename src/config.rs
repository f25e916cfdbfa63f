//! Runtime-tunable constants for the render pipeline.
//!
//! Out of scope per the driver's charter: loading these from a file or
//! CLI. Callers construct a `PanelConfig` and pass it to `PanelDriver::open`.

/// Maximum rows per rectangle-path tile (§4.7). 320 columns * 40 rows is
/// comfortably inside the device's 16-bit payload byte counter.
pub const MAX_BLOCK_HEIGHT: usize = 40;

/// Native panel dimensions, independent of logical orientation.
pub const PANEL_WIDTH: u16 = 320;
pub const PANEL_HEIGHT: u16 = 480;

#[derive(Debug, Clone, Copy)]
pub struct PanelConfig {
    /// Calibrated bytes-equivalent cost per sparse pixel command (§4.5).
    pub heuristic_cost_per_pixel: u32,
    /// Recovery reconnect window.
    pub recovery_window: std::time::Duration,
    /// Settle delay between `Reset` and `Clear` during recovery.
    pub recovery_settle_delay: std::time::Duration,
    /// Timeout used by the public `reset()` operation's reconnect.
    pub reset_timeout: std::time::Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            heuristic_cost_per_pixel: 12,
            recovery_window: std::time::Duration::from_secs(1),
            recovery_settle_delay: std::time::Duration::from_millis(50),
            reset_timeout: std::time::Duration::from_secs(5),
        }
    }
}
