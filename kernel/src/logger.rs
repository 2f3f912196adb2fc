//! Kernel logger
//!
//! Backend for the `log` facade. Every record is formatted once as
//! `[LEVEL] target: message` and appended to a fixed-size capture ring;
//! when the ring is full the oldest bytes are dropped. A console sink can
//! be attached once the platform has somewhere to print.

use alloc::string::String;
use core::fmt::{self, Write};

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Size of the capture ring (16 KiB).
const CAPTURE_SIZE: usize = 16 * 1024;

/// Longest single line kept; longer messages are truncated.
const LINE_SIZE: usize = 256;

static LOGGER: KernelLogger = KernelLogger::new();

/// Where formatted lines are echoed in addition to the capture ring.
static CONSOLE: OnceCell<fn(&str)> = OnceCell::uninit();

struct CaptureRing {
    buffer: [u8; CAPTURE_SIZE],
    /// Index of the oldest byte.
    head: usize,
    len: usize,
}

impl CaptureRing {
    const fn new() -> Self {
        Self {
            buffer: [0; CAPTURE_SIZE],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let tail = (self.head + self.len) % CAPTURE_SIZE;
            self.buffer[tail] = byte;
            if self.len == CAPTURE_SIZE {
                self.head = (self.head + 1) % CAPTURE_SIZE;
            } else {
                self.len += 1;
            }
        }
    }

    fn contents(&self) -> String {
        let bytes: alloc::vec::Vec<u8> = (0..self.len)
            .map(|i| self.buffer[(self.head + i) % CAPTURE_SIZE])
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

/// Stack buffer a single line is formatted into.
struct LineBuffer {
    bytes: [u8; LINE_SIZE],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            bytes: [0; LINE_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        // Truncation can split a code point; keep the valid prefix.
        match core::str::from_utf8(&self.bytes[..self.len]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_SIZE - self.len;
        let take = s.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

pub struct KernelLogger {
    ring: Mutex<CaptureRing>,
}

impl KernelLogger {
    const fn new() -> Self {
        KernelLogger {
            ring: Mutex::new(CaptureRing::new()),
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = LineBuffer::new();
        let _ = writeln!(line, "[{:>5}] {}: {}", record.level(), record.target(), record.args());

        self.ring.lock().push(line.as_str().as_bytes());
        if let Some(console) = CONSOLE.get() {
            console(line.as_str());
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger with the given maximum level.
///
/// A second call only adjusts the level.
pub fn init(level: LevelFilter) {
    let installed = log::set_logger(&LOGGER).is_ok();
    log::set_max_level(level);
    if installed {
        log::info!("kernel logger installed at {}", level);
    } else {
        log::trace!("kernel logger already installed");
    }
}

/// Forward every future line to `sink`. Only the first sink is kept.
pub fn set_console(sink: fn(&str)) -> bool {
    CONSOLE.try_init_once(|| sink).is_ok()
}

/// Everything still held by the capture ring.
pub fn captured() -> String {
    LOGGER.ring.lock().contents()
}

/// Drop all captured lines.
pub fn clear_captured() {
    LOGGER.ring.lock().clear();
}
