//! Hardware link: opening the serial port and the blocking read loop.
//!
//! The read loop runs on a dedicated blocking worker. It suspends on each
//! read, feeds whatever arrived into a [`FrameDecoder`], and forwards decoded
//! samples over a channel. It ends on link close, on a read error, when its
//! [`LinkHandle`] is stopped, or when nobody is receiving; it never restarts
//! on its own.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::decoder::FrameDecoder;
use crate::error::{Error, Result};
use crate::sample::Sample;

/// A byte stream from the rig.
pub type LinkReader = Box<dyn Read + Send>;

/// Something that can open the hardware link.
#[async_trait::async_trait]
pub trait LinkOpener: Send + Sync {
    /// Human-readable link identifier, for logs.
    fn name(&self) -> String;

    /// Open the link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkOpen`] if the device is missing, busy, or
    /// refuses the configuration.
    async fn open(&self) -> Result<LinkReader>;
}

/// Opens a serial port with `serialport`.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    config: LinkConfig,
}

impl SerialOpener {
    /// Create an opener for the port named in `config`.
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl LinkOpener for SerialOpener {
    fn name(&self) -> String {
        format!("{}@{}", self.config.port, self.config.baud_rate)
    }

    async fn open(&self) -> Result<LinkReader> {
        let config = self.config.clone();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&config.port, config.baud_rate)
                .timeout(config.read_timeout())
                .open()
                .map_err(|e| Error::link_open(&config.port, e.to_string()))
        })
        .await
        .map_err(|e| Error::internal(format!("serial open task failed: {e}")))??;

        info!(link = %self.name(), "serial link opened");
        Ok(Box::new(port))
    }
}

/// Names of the serial ports present on this machine.
///
/// # Errors
///
/// Returns an error if the platform cannot enumerate ports.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::link_open("*", format!("cannot enumerate ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Cloneable stop signal for a running read loop.
#[derive(Debug, Clone, Default)]
pub struct LinkHandle {
    stop_signal: Arc<AtomicBool>,
}

impl LinkHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the read loop to stop after its current read.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Why a read loop ended.
#[derive(Debug)]
pub enum LinkExit {
    /// The link reported end of stream.
    Closed,
    /// [`LinkHandle::stop`] was called.
    Stopped,
    /// The receiving side went away.
    Abandoned,
    /// An unrecoverable read error.
    Failed(Error),
}

/// Read from `reader` until the link ends, sending decoded samples to `sink`.
///
/// Read timeouts and interrupts are retried; they are how a quiet serial port
/// reports "nothing yet".
pub fn run_read_loop(
    mut reader: LinkReader,
    mut decoder: FrameDecoder,
    sink: &mpsc::Sender<Sample>,
    handle: &LinkHandle,
) -> LinkExit {
    let mut buf = [0u8; 256];
    loop {
        if handle.should_stop() {
            debug!("read loop stopped on request");
            return LinkExit::Stopped;
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => {
                info!("link closed");
                return LinkExit::Closed;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => continue,
            Err(e) => {
                warn!("link read failed: {e}");
                return LinkExit::Failed(Error::LinkRead(e));
            }
        };

        for sample in decoder.push(&buf[..n]) {
            if sink.blocking_send(sample).is_err() {
                debug!("sample receiver gone, ending read loop");
                return LinkExit::Abandoned;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Replays scripted chunks, then reports end of stream.
    pub struct ScriptedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        pub fn new<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| Ok(c.as_ref().to_vec())).collect(),
            }
        }

        pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
            self.chunks.push_back(Err(io::Error::new(kind, "scripted failure")));
            self
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
            }
        }
    }

    /// A port that stays open but never sends anything.
    pub struct QuietReader;

    impl Read for QuietReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
        }
    }

    enum Script {
        Chunks(Vec<&'static str>),
        Quiet,
        Fail,
    }

    /// Opener that hands out a scripted reader, or fails.
    pub struct ScriptedOpener {
        script: Script,
    }

    impl ScriptedOpener {
        pub fn with_chunks(chunks: Vec<&'static str>) -> Self {
            Self {
                script: Script::Chunks(chunks),
            }
        }

        pub fn quiet() -> Self {
            Self {
                script: Script::Quiet,
            }
        }

        pub fn failing() -> Self {
            Self {
                script: Script::Fail,
            }
        }
    }

    #[async_trait::async_trait]
    impl LinkOpener for ScriptedOpener {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        async fn open(&self) -> Result<LinkReader> {
            match &self.script {
                Script::Chunks(chunks) => Ok(Box::new(ScriptedReader::new(chunks.clone()))),
                Script::Quiet => Ok(Box::new(QuietReader)),
                Script::Fail => Err(Error::link_open("scripted", "no such device")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedOpener, ScriptedReader};
    use super::*;

    fn run(reader: ScriptedReader, capacity: usize) -> (LinkExit, Vec<(i32, u32)>) {
        let (tx, mut rx) = mpsc::channel(capacity);
        let exit = run_read_loop(
            Box::new(reader),
            FrameDecoder::default(),
            &tx,
            &LinkHandle::new(),
        );
        drop(tx);
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push((s.angle, s.distance));
        }
        (exit, out)
    }

    #[test]
    fn test_read_loop_decodes_split_frames() {
        let reader = ScriptedReader::new(["12,3", "4.90,", "200.bad.", "7,7"]);
        let (exit, samples) = run(reader, 16);
        assert!(matches!(exit, LinkExit::Closed));
        assert_eq!(samples, vec![(12, 34), (90, 200)]);
    }

    #[test]
    fn test_read_loop_retries_timeouts() {
        let reader = ScriptedReader::new(["1,1."])
            .then_fail(std::io::ErrorKind::TimedOut);
        let (exit, samples) = run(reader, 4);
        assert!(matches!(exit, LinkExit::Closed));
        assert_eq!(samples, vec![(1, 1)]);
    }

    #[test]
    fn test_read_loop_ends_on_error() {
        let reader = ScriptedReader::new(["1,1."]).then_fail(std::io::ErrorKind::BrokenPipe);
        let (exit, samples) = run(reader, 4);
        assert!(matches!(exit, LinkExit::Failed(Error::LinkRead(_))));
        assert_eq!(samples, vec![(1, 1)]);
    }

    #[test]
    fn test_read_loop_honours_stop() {
        let handle = LinkHandle::new();
        handle.stop();
        let (tx, _rx) = mpsc::channel(1);
        let exit = run_read_loop(
            Box::new(ScriptedReader::new(["1,1."])),
            FrameDecoder::default(),
            &tx,
            &handle,
        );
        assert!(matches!(exit, LinkExit::Stopped));
    }

    #[test]
    fn test_read_loop_abandoned_without_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let exit = run_read_loop(
            Box::new(ScriptedReader::new(["1,1."])),
            FrameDecoder::default(),
            &tx,
            &LinkHandle::new(),
        );
        assert!(matches!(exit, LinkExit::Abandoned));
    }

    #[test]
    fn test_link_handle_clone_shares_signal() {
        let a = LinkHandle::new();
        let b = a.clone();
        a.stop();
        assert!(b.should_stop());
    }

    #[tokio::test]
    async fn test_failing_opener() {
        let err = ScriptedOpener::failing().open().await.err().unwrap();
        assert!(err.is_link_error());
    }

    #[tokio::test]
    async fn test_serial_opener_missing_device() {
        let opener = SerialOpener::new(LinkConfig {
            port: "/nonexistent/radarlink-tty".to_string(),
            ..LinkConfig::default()
        });
        assert!(opener.name().starts_with("/nonexistent/radarlink-tty@"));
        let err = opener.open().await.err().unwrap();
        assert!(matches!(err, Error::LinkOpen { .. }));
    }
}
