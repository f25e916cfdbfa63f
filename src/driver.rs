//! Public driver facade and orientation state machine (§3 `DriverState`,
//! §4.8).

use log::info;

use crate::buffer::ScreenBuffer;
use crate::color::{rgb888_to_565_round, Rgb565};
use crate::config::{PanelConfig, MAX_BLOCK_HEIGHT, PANEL_HEIGHT, PANEL_WIDTH};
use crate::diff::{self, BoundingBox};
use crate::error::{PanelError, Result};
use crate::link::{ByteSink, RecoverySnapshot, SerialLink};
use crate::protocol::{self, Command};
use crate::strategy::{self, Strategy};
use crate::transmit;

/// Panel orientation. Portrait/ReversePortrait map 1:1 to the panel's
/// native 320x480 axes; Landscape/ReverseLandscape present a logical
/// 480x320 surface and require software rotation at pack time (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    ReversePortrait,
    ReverseLandscape,
}

impl Orientation {
    /// Numeric ordinal used by the wire protocol (§6: `ord+100`).
    pub fn as_wire_ordinal(self) -> u8 {
        match self {
            Orientation::Portrait => 0,
            Orientation::Landscape => 1,
            Orientation::ReversePortrait => 2,
            Orientation::ReverseLandscape => 3,
        }
    }

    /// Logical `(width, height)` this orientation presents to callers.
    fn logical_dims(self) -> (usize, usize) {
        match self {
            Orientation::Portrait | Orientation::ReversePortrait => {
                (PANEL_WIDTH as usize, PANEL_HEIGHT as usize)
            }
            Orientation::Landscape | Orientation::ReverseLandscape => {
                (PANEL_HEIGHT as usize, PANEL_WIDTH as usize)
            }
        }
    }

    fn requires_software_rotation(self) -> bool {
        matches!(self, Orientation::Landscape | Orientation::ReverseLandscape)
    }
}

/// Driver-held state (§3 `DriverState`): orientation, logical dims,
/// rotation flag, shadow, and last brightness. The serial link is held
/// alongside, not inside, this struct so it can be borrowed mutably
/// while `state` is borrowed immutably during a write (see `PanelDriver`).
struct DriverState {
    orientation: Orientation,
    software_rotation: bool,
    shadow: ScreenBuffer,
    brightness: u8,
}

impl DriverState {
    fn new() -> Self {
        DriverState {
            orientation: Orientation::Portrait,
            software_rotation: false,
            shadow: ScreenBuffer::new(PANEL_WIDTH as usize, PANEL_HEIGHT as usize),
            brightness: 100,
        }
    }
}

/// Which payload bytes a `send` call should transmit after the scratch
/// header, if any.
enum Payload<'a> {
    /// No payload (the control commands: `Reset`, `Clear`, `ScreenOff`,
    /// `ScreenOn`, `Brightness`).
    None,
    /// An independent slice that is not borrowed from any of
    /// `PanelDriver`'s own scratch fields (e.g. a single pixel's 2-byte
    /// color, already a plain stack value).
    Local(&'a [u8]),
    /// The driver's pooled tile-payload buffer (`scratch_payload`).
    Scratch,
    /// `n` bytes of the scratch header immediately following the header
    /// itself — only `Orientation` packs header and payload into one
    /// contiguous scratch write.
    ScratchTail(usize),
}

/// The public driver facade.
pub struct PanelDriver<S: ByteSink> {
    link: SerialLink<S>,
    state: DriverState,
    config: PanelConfig,
    /// Reusable staging area for command headers (§3 "Command scratch"):
    /// every outbound header is packed here instead of allocating a
    /// fresh buffer per write. 16 bytes covers the largest header this
    /// protocol emits (a 6-byte rect/control header plus `Orientation`'s
    /// 5-byte tail).
    scratch_header: [u8; 16],
    /// Reusable payload buffer for the rectangle path's tiles; cleared
    /// and refilled per tile rather than reallocated, so its backing
    /// allocation is bounded by the largest tile seen (§5).
    scratch_payload: Vec<u8>,
    /// Set once the caller explicitly calls `close()`. Distinguishes an
    /// intentional shutdown from a transient link failure: the latter
    /// still funnels through recovery, but once explicitly closed,
    /// writes fail fast instead.
    explicitly_closed: bool,
}

impl<S: ByteSink> PanelDriver<S> {
    /// Connects and initializes the shadow to 320x480 Portrait,
    /// brightness 100 (§4.8 `open`).
    pub fn open(sink: S, config: PanelConfig) -> Self {
        PanelDriver {
            link: SerialLink::new(sink),
            state: DriverState::new(),
            config,
            scratch_header: [0u8; 16],
            scratch_payload: Vec::new(),
            explicitly_closed: false,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.state.orientation
    }

    pub fn logical_dims(&self) -> (usize, usize) {
        (self.state.shadow.width(), self.state.shadow.height())
    }

    /// Writes `header_len` bytes of the scratch header plus `payload`,
    /// routing through the link's recovery protocol. Fails fast with
    /// `Disconnected`, without touching the link, if the driver was
    /// explicitly `close()`d.
    fn send(&mut self, header_len: usize, payload: Payload<'_>) -> Result<()> {
        if self.explicitly_closed {
            return Err(PanelError::Disconnected);
        }
        let snapshot = RecoverySnapshot {
            last_brightness: self.state.brightness,
            orientation_ordinal: self.state.orientation.as_wire_ordinal(),
            software_rotation: self.state.software_rotation,
            shadow: &self.state.shadow,
        };
        match payload {
            Payload::None => {
                let header = &self.scratch_header[..header_len];
                self.link.write_all(header, None, snapshot, &self.config)
            }
            Payload::Local(p) => {
                let header = &self.scratch_header[..header_len];
                self.link.write_all(header, Some(p), snapshot, &self.config)
            }
            Payload::Scratch => {
                let header = &self.scratch_header[..header_len];
                self.link
                    .write_all(header, Some(&self.scratch_payload), snapshot, &self.config)
            }
            Payload::ScratchTail(n) => {
                let (header, tail) = self.scratch_header.split_at(header_len);
                self.link.write_all(header, Some(&tail[..n]), snapshot, &self.config)
            }
        }
    }

    /// `close()` — releases the link. Further writes fail immediately
    /// with `Disconnected`, without attempting link recovery, until a
    /// fresh `PanelDriver` is opened.
    pub fn close(&mut self) {
        self.link.close_idempotent();
        self.explicitly_closed = true;
    }

    /// `reset()` — sends `Reset`, closes, reconnects with a 5s timeout.
    pub fn reset(&mut self) -> Result<()> {
        protocol::encode_control(&mut self.scratch_header[..protocol::HEADER_LEN], Command::Reset);
        self.send(protocol::HEADER_LEN, Payload::None)?;
        self.link.close_idempotent();
        self.link.reopen_with_backoff(self.config.reset_timeout)
    }

    /// `clear()` — sends `Clear`, fills shadow with white (`0xFFFF`).
    pub fn clear(&mut self) -> Result<()> {
        protocol::encode_control(&mut self.scratch_header[..protocol::HEADER_LEN], Command::Clear);
        self.send(protocol::HEADER_LEN, Payload::None)?;
        self.state.shadow.clear_to_color(0xFFFF);
        Ok(())
    }

    pub fn screen_on(&mut self) -> Result<()> {
        protocol::encode_control(&mut self.scratch_header[..protocol::HEADER_LEN], Command::ScreenOn);
        self.send(protocol::HEADER_LEN, Payload::None)
    }

    pub fn screen_off(&mut self) -> Result<()> {
        protocol::encode_control(&mut self.scratch_header[..protocol::HEADER_LEN], Command::ScreenOff);
        self.send(protocol::HEADER_LEN, Payload::None)
    }

    /// `set_brightness(level)` — clamps to [0,100], records it, emits
    /// `Brightness`. Clamping is silent per §7: out-of-range input is
    /// not an `InvalidArgument`.
    pub fn set_brightness(&mut self, level: u8) -> Result<()> {
        let clamped = level.min(100);
        protocol::encode_brightness(&mut self.scratch_header[..protocol::HEADER_LEN], clamped);
        self.send(protocol::HEADER_LEN, Payload::None)?;
        self.state.brightness = clamped;
        Ok(())
    }

    /// `set_orientation(o)` — updates logical dims, toggles
    /// `software_rotation`, emits `Orientation` (native 320x480 payload),
    /// allocates a fresh shadow, then clears. Only permitted while the
    /// link is healthy; a failing call leaves prior state untouched.
    pub fn set_orientation(&mut self, orientation: Orientation) -> Result<()> {
        if !self.link.is_connected() || self.explicitly_closed {
            return Err(PanelError::Disconnected);
        }

        protocol::encode_orientation(
            &mut self.scratch_header[..11],
            orientation.as_wire_ordinal(),
            PANEL_WIDTH,
            PANEL_HEIGHT,
        );
        // Orientation writes carry no separate payload; the whole 11
        // bytes is handed over as a single logical header-with-tail.
        self.send(6, Payload::ScratchTail(5))?;

        let (w, h) = orientation.logical_dims();
        self.state.orientation = orientation;
        self.state.software_rotation = orientation.requires_software_rotation();
        self.state.shadow = ScreenBuffer::new(w, h);
        info!("orientation set to {orientation:?} ({w}x{h} logical)");

        self.clear()
    }

    /// `set_pixel(x, y, r, g, b)` — round-to-nearest convert, shadow-set,
    /// emit a single pixel command.
    pub fn set_pixel(&mut self, x: usize, y: usize, r: u8, g: u8, b: u8) -> Result<()> {
        let color = rgb888_to_565_round(r, g, b);
        self.state.shadow.set(x, y, color)?;

        protocol::encode_rect_header(
            &mut self.scratch_header[..protocol::HEADER_LEN],
            x as u16,
            y as u16,
            1,
            1,
            Command::Draw,
        );
        let payload = transmit::pixel_payload(color);
        self.send(protocol::HEADER_LEN, Payload::Local(&payload))
    }

    /// `display_buffer(x, y, buf)` — dispatches the full §4.4→§4.7
    /// pipeline: diff, choose strategy, transmit.
    pub fn display_buffer(&mut self, x: usize, y: usize, buf: &[Rgb565], w: usize, h: usize) -> Result<()> {
        if buf.len() != w * h {
            return Err(PanelError::InvalidArgument(
                "submitted buffer length does not match w*h",
            ));
        }
        let (logical_w, logical_h) = self.logical_dims();
        if x + w > logical_w || y + h > logical_h {
            return Err(PanelError::InvalidArgument(
                "submitted region exceeds logical surface",
            ));
        }

        let result = diff::scan(
            buf,
            w,
            h,
            self.state.shadow.as_slice(),
            self.state.shadow.width(),
            x,
            y,
        );

        let bbox = match result.bbox {
            None => return Ok(()),
            Some(b) => b,
        };

        let strategy = strategy::choose(
            result.change_count,
            bbox.width(),
            bbox.height(),
            self.config.heuristic_cost_per_pixel,
        );

        match strategy {
            Strategy::Sparse => self.transmit_sparse(buf, w, h, x, y),
            Strategy::Rectangle => self.transmit_rectangle(buf, w, x, y, bbox),
        }
    }

    /// Sparse path (§4.6): one pixel command per changed cell. Each
    /// payload is a stack-local two-byte array, so this hot loop never
    /// touches the heap (§5).
    fn transmit_sparse(&mut self, submitted: &[Rgb565], w: usize, h: usize, left: usize, top: usize) -> Result<()> {
        for row in 0..h {
            for col in 0..w {
                let s = submitted[row * w + col];
                let d = self
                    .state
                    .shadow
                    .get(left + col, top + row)
                    .expect("in-bounds by construction");
                if s != d {
                    self.state
                        .shadow
                        .set(left + col, top + row, s)
                        .expect("in-bounds by construction");
                    protocol::encode_rect_header(
                        &mut self.scratch_header[..protocol::HEADER_LEN],
                        (left + col) as u16,
                        (top + row) as u16,
                        1,
                        1,
                        Command::Draw,
                    );
                    let payload = transmit::pixel_payload(s);
                    self.send(protocol::HEADER_LEN, Payload::Local(&payload))?;
                }
            }
        }
        Ok(())
    }

    /// Rectangle path (§4.7): sync the bounding box into the shadow,
    /// then transmit tile by tile, reusing the pooled `scratch_payload`
    /// buffer across tiles so peak residency stays at one tile plus one
    /// header (§5).
    fn transmit_rectangle(
        &mut self,
        submitted: &[Rgb565],
        w: usize,
        left: usize,
        top: usize,
        bbox: BoundingBox,
    ) -> Result<()> {
        transmit::sync_rectangle(submitted, w, &mut self.state.shadow, left, top, bbox);

        let abs_left = left + bbox.min_x;
        let abs_top = top + bbox.min_y;
        let diff_w = bbox.width();
        let diff_h = bbox.height();
        let shadow_w = self.state.shadow.width();
        let software_rotation = self.state.software_rotation;

        let mut consumed = 0usize;
        while consumed < diff_h {
            let tile_h = (diff_h - consumed).min(MAX_BLOCK_HEIGHT);
            let (px, py, pw, ph) = transmit::pack_tile(
                self.state.shadow.as_slice(),
                shadow_w,
                abs_left,
                abs_top + consumed,
                diff_w,
                tile_h,
                software_rotation,
                &mut self.scratch_payload,
            );
            protocol::encode_rect_header(
                &mut self.scratch_header[..protocol::HEADER_LEN],
                px,
                py,
                pw,
                ph,
                Command::Draw,
            );
            self.send(protocol::HEADER_LEN, Payload::Scratch)?;
            consumed += tile_h;
        }
        Ok(())
    }
}
