//! # smartpanel-driver
//!
//! A user-space driver for a family of 3.5" USB-attached smart display
//! panels: 320x480 RGB565, addressed over a serial (CDC) byte stream.
//!
//! This crate's sole concern is the render pipeline: diffing a submitted
//! frame against a cached shadow of the device's contents, choosing
//! between a per-pixel and a tiled bulk transmission strategy, packing
//! the panel's byte-oriented wire commands, and keeping the serial link
//! alive across transient failures.
//!
//! Out of scope, by design: image decoding/scaling/color-space
//! conversion of application content, the concrete serial transport
//! (port enumeration, DTR/RTS lifecycle, OS buffer sizing), a CLI or
//! config-file loader, and a color-name table. Callers provide a
//! [`ByteSink`] implementation and drive the [`PanelDriver`] facade
//! directly.
//!
//! ## Usage
//! 1. Implement [`ByteSink`] for your transport (e.g. a
//!    `serialport::SerialPort` wrapper).
//! 2. Construct a [`PanelConfig`], tuning the calibrated
//!    strategy-selection constant if your panel's latency profile
//!    differs from the default.
//! 3. Open a [`PanelDriver`] and call its public operations —
//!    `display_buffer`, `set_pixel`, `set_orientation`, `clear`, and so
//!    on.

mod buffer;
mod color;
mod config;
mod diff;
mod driver;
mod error;
mod link;
mod protocol;
mod strategy;
mod transmit;

pub use buffer::ScreenBuffer;
pub use color::{rgb565_to_rgb888, rgb888_to_565_round, rgb888_to_565_truncating, Rgb565};
pub use config::{PanelConfig, MAX_BLOCK_HEIGHT, PANEL_HEIGHT, PANEL_WIDTH};
pub use diff::{scan as diff_scan, BoundingBox, DiffResult};
pub use driver::{Orientation, PanelDriver};
pub use error::{PanelError, Result};
pub use link::ByteSink;
pub use protocol::{decode_header, Command, HEADER_LEN};
pub use strategy::{choose as choose_strategy, Strategy};
