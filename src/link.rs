//! Serial link and recovery protocol (§4.9).

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::buffer::ScreenBuffer;
use crate::config::{PanelConfig, MAX_BLOCK_HEIGHT, PANEL_HEIGHT, PANEL_WIDTH};
use crate::error::{PanelError, Result};
use crate::protocol::{self, Command};
use crate::transmit;

/// The minimal byte-sink contract the render pipeline requires.
///
/// Out of scope here: port enumeration, DTR/RTS lifecycle, and baud
/// configuration — those live in whatever concrete sink the caller
/// plugs in. This trait only needs a blocking write and a way to
/// recycle the connection during recovery.
pub trait ByteSink {
    /// Blocks until `buf` has been fully handed to the transport, or
    /// fails with an I/O error.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Closes the underlying connection. Errors are ignored by callers
    /// per the recovery protocol (§4.9 step 1).
    fn close(&mut self);

    /// Reopens the connection, reusing whatever port/address the sink
    /// was originally constructed with.
    fn reopen(&mut self) -> io::Result<()>;
}

/// Snapshot of the state recovery needs to restore the panel, borrowed
/// from the driver for the duration of one `write_all` call.
pub struct RecoverySnapshot<'a> {
    pub last_brightness: u8,
    pub orientation_ordinal: u8,
    pub software_rotation: bool,
    pub shadow: &'a ScreenBuffer,
}

/// Owns the byte sink and runs the recovery protocol on write failure.
pub struct SerialLink<S: ByteSink> {
    sink: S,
    connected: bool,
}

impl<S: ByteSink> SerialLink<S> {
    pub fn new(sink: S) -> Self {
        SerialLink {
            sink,
            connected: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Closes the sink. Safe to call repeatedly: a second call simply
    /// closes an already-closed sink (`ByteSink::close` is required to
    /// ignore that itself, matching the "ignoring errors" wording of the
    /// recovery protocol's own close step).
    pub fn close_idempotent(&mut self) {
        self.sink.close();
        self.connected = false;
    }

    /// Opens a fresh sink with backoff, retried within `window`. Used by
    /// the driver facade's `open()`/`reset()` operations, which must
    /// tolerate a transiently busy port (§7 `PortBusy`).
    pub fn reopen_with_backoff(&mut self, window: Duration) -> Result<()> {
        let deadline = Instant::now() + window;
        let mut last_err = None;
        loop {
            match self.sink.reopen() {
                Ok(()) => {
                    self.connected = true;
                    return Ok(());
                }
                Err(e) => {
                    let busy = matches!(e.kind(), io::ErrorKind::PermissionDenied)
                        || matches!(e.kind(), io::ErrorKind::AddrInUse);
                    last_err = Some(e);
                    if Instant::now() >= deadline {
                        let e = last_err.unwrap();
                        return Err(if busy {
                            PanelError::PortBusy(e)
                        } else {
                            PanelError::RecoveryExhausted(e)
                        });
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Blocking write of a header and optional payload. On I/O failure,
    /// runs the recovery protocol once and retries the write; a second
    /// failure (or a recovery failure) surfaces to the caller.
    pub fn write_all(
        &mut self,
        header: &[u8],
        payload: Option<&[u8]>,
        recovery: RecoverySnapshot<'_>,
        config: &PanelConfig,
    ) -> Result<()> {
        match self.try_write(header, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("panel write failed ({e}), starting recovery");
                self.connected = false;
                self.recover(recovery, config)?;
                self.try_write(header, payload)
                    .map_err(PanelError::WriteFailed)
            }
        }
    }

    fn try_write(&mut self, header: &[u8], payload: Option<&[u8]>) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link down"));
        }
        self.sink.write_all(header)?;
        if let Some(p) = payload {
            self.sink.write_all(p)?;
        }
        Ok(())
    }

    /// §4.9 recovery protocol:
    /// 1. close, ignoring errors
    /// 2. reopen within a 1s window
    /// 3. re-emit Reset, settle, Clear, Brightness, Orientation, full redraw
    /// 4. caller resumes its write, or gets `RecoveryExhausted`
    fn recover(&mut self, snapshot: RecoverySnapshot<'_>, config: &PanelConfig) -> Result<()> {
        self.sink.close();
        self.reopen_with_backoff(config.recovery_window)?;

        let mut hdr = [0u8; protocol::HEADER_LEN];
        protocol::encode_control(&mut hdr, Command::Reset);
        self.sink.write_all(&hdr).map_err(PanelError::WriteFailed)?;

        thread::sleep(config.recovery_settle_delay);

        protocol::encode_control(&mut hdr, Command::Clear);
        self.sink.write_all(&hdr).map_err(PanelError::WriteFailed)?;

        protocol::encode_brightness(&mut hdr, snapshot.last_brightness);
        self.sink.write_all(&hdr).map_err(PanelError::WriteFailed)?;

        let mut orient_hdr = [0u8; 11];
        protocol::encode_orientation(
            &mut orient_hdr,
            snapshot.orientation_ordinal,
            PANEL_WIDTH,
            PANEL_HEIGHT,
        );
        self.sink
            .write_all(&orient_hdr)
            .map_err(PanelError::WriteFailed)?;

        // Full-shadow redraw (§4.9 step 3), tiled the same way an ordinary
        // rectangle transmit is. One header array and one pooled payload
        // buffer are reused across every tile rather than allocated per
        // tile (§5).
        let shadow_w = snapshot.shadow.width();
        let shadow_h = snapshot.shadow.height();
        let mut tile_header = [0u8; protocol::HEADER_LEN];
        let mut tile_payload = Vec::new();
        let mut consumed = 0usize;
        while consumed < shadow_h {
            let tile_h = (shadow_h - consumed).min(MAX_BLOCK_HEIGHT);
            let (px, py, pw, ph) = transmit::pack_tile(
                snapshot.shadow.as_slice(),
                shadow_w,
                0,
                consumed,
                shadow_w,
                tile_h,
                snapshot.software_rotation,
                &mut tile_payload,
            );
            protocol::encode_rect_header(&mut tile_header, px, py, pw, ph, Command::Draw);
            self.sink.write_all(&tile_header).map_err(PanelError::WriteFailed)?;
            self.sink.write_all(&tile_payload).map_err(PanelError::WriteFailed)?;
            consumed += tile_h;
        }

        debug!("panel recovery complete");
        self.connected = true;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every write and can be told to fail the next N writes,
    /// the way the teacher's `ControllerInterface` stands in for real
    /// SPI hardware in driver tests.
    #[derive(Default)]
    pub struct MockSinkState {
        pub writes: Vec<Vec<u8>>,
        pub fail_next: usize,
        pub reopen_calls: usize,
        pub closed: bool,
    }

    #[derive(Clone, Default)]
    pub struct MockSink(pub Arc<Mutex<MockSinkState>>);

    impl MockSink {
        pub fn new() -> Self {
            MockSink(Arc::new(Mutex::new(MockSinkState::default())))
        }

        pub fn fail_next_writes(&self, n: usize) {
            self.0.lock().unwrap().fail_next = n;
        }

        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().writes.clone()
        }
    }

    impl ByteSink for MockSink {
        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            let mut state = self.0.lock().unwrap();
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock failure"));
            }
            state.writes.push(buf.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closed = true;
        }

        fn reopen(&mut self) -> io::Result<()> {
            let mut state = self.0.lock().unwrap();
            state.reopen_calls += 1;
            state.closed = false;
            Ok(())
        }
    }
}
