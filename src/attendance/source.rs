use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use super::ScanError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanSourceState {
    Idle,
    Scanning,
    Stopped,
}

/// A device that decodes badges into text, one frame at a time.
#[async_trait]
pub trait ScanSource: Send {
    /// Starts decoding. Starting an already running source does nothing.
    async fn start(&mut self) -> Result<(), ScanError>;

    /// Next decoded text; `None` once the source is stopped or exhausted.
    async fn next_decoded(&mut self) -> Option<String>;

    /// Stops decoding and drops buffered frames. Stopping twice does nothing.
    async fn stop(&mut self) -> Result<(), ScanError>;

    fn state(&self) -> ScanSourceState;
}

/// Producer half of a [`ChannelScanSource`]; the client's decoder pushes here.
#[derive(Clone, Debug)]
pub struct ScanFeed {
    tx: mpsc::Sender<String>,
}

impl ScanFeed {
    /// Queues one decoded frame. Frames arriving while the buffer is full are
    /// dropped, like frames a camera skips while busy.
    pub fn push(&self, text: String) -> Result<(), ScanError> {
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!("scan buffer full; frame dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(ScanError::SessionClosed),
        }
    }
}

/// Scan source fed over a bounded channel.
pub struct ChannelScanSource {
    rx: Option<mpsc::Receiver<String>>,
    state: ScanSourceState,
}

/// Builds a connected feed/source pair holding at most `capacity` frames.
pub fn scan_channel(capacity: usize) -> (ScanFeed, ChannelScanSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ScanFeed { tx },
        ChannelScanSource {
            rx: Some(rx),
            state: ScanSourceState::Idle,
        },
    )
}

impl ChannelScanSource {
    /// A source with no device behind it; `start` fails.
    #[cfg(test)]
    pub fn unavailable() -> Self {
        Self {
            rx: None,
            state: ScanSourceState::Idle,
        }
    }
}

#[async_trait]
impl ScanSource for ChannelScanSource {
    async fn start(&mut self) -> Result<(), ScanError> {
        match self.state {
            ScanSourceState::Scanning => Ok(()),
            _ if self.rx.is_none() => Err(ScanError::DeviceUnavailable(
                "no decoder attached to this source".into(),
            )),
            _ => {
                self.state = ScanSourceState::Scanning;
                Ok(())
            }
        }
    }

    async fn next_decoded(&mut self) -> Option<String> {
        if self.state != ScanSourceState::Scanning {
            return None;
        }
        self.rx.as_mut()?.recv().await
    }

    async fn stop(&mut self) -> Result<(), ScanError> {
        if self.state != ScanSourceState::Scanning {
            return Ok(());
        }
        self.state = ScanSourceState::Stopped;
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            while rx.try_recv().is_ok() {}
        }
        Ok(())
    }

    fn state(&self) -> ScanSourceState {
        self.state
    }
}
