//! Beacon scan transport for Lampyris
//!
//! The wire scan itself is an external collaborator: a helper scanner
//! process prints one "address payload-hex" line per sighting. This module
//! owns that process and turns its stdout into a stream of advertisements
//! for the supervisor loop.

use crate::config::ScanConfig;
use crate::error::{LampyrisError, Result};
use crate::logging::{StructuredLogger, get_logger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One raw advertisement as delivered by the scan transport
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Claimed sender identity (beacon address)
    pub address: String,

    /// Raw manufacturer data as hex characters
    pub payload: String,
}

/// Source of beacon advertisements
#[async_trait::async_trait]
pub trait ScanTransport: Send + Sync {
    /// Start scanning; advertisements arrive on the returned channel
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Advertisement>>;

    /// Stop scanning and release the underlying transport
    async fn stop(&mut self) -> Result<()>;
}

/// Scan transport backed by an external scanner process
pub struct HelperScan {
    command: String,
    args: Vec<String>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    logger: StructuredLogger,
}

impl HelperScan {
    /// Create a transport for the configured scanner command
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            command: config.helper_command.clone(),
            args: config.helper_args.clone(),
            child: None,
            reader: None,
            logger: get_logger("scan"),
        }
    }
}

#[async_trait::async_trait]
impl ScanTransport for HelperScan {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Advertisement>> {
        if self.child.is_some() {
            return Err(LampyrisError::transport("Scanner already running"));
        }

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdout(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LampyrisError::transport(format!(
                    "Failed to spawn scanner '{}': {}",
                    self.command, e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LampyrisError::transport("Scanner process has no stdout"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let logger = self.logger.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_helper_line(line) {
                            Some(advert) => {
                                if tx.send(advert).is_err() {
                                    break;
                                }
                            }
                            None => {
                                logger.debug(&format!("Ignoring malformed scanner line: {}", line));
                            }
                        }
                    }
                    Ok(None) => {
                        // EOF; the watchdog covers the resulting silence
                        logger.warn("Scanner stdout closed");
                        break;
                    }
                    Err(e) => {
                        logger.error(&format!("Failed to read scanner output: {}", e));
                        break;
                    }
                }
            }
        });

        self.child = Some(child);
        self.reader = Some(reader);
        self.logger.info(&format!("Scanner started: {}", self.command));
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }

        if let Some(mut child) = self.child.take() {
            child
                .kill()
                .await
                .map_err(|e| LampyrisError::transport(format!("Failed to stop scanner: {}", e)))?;
            self.logger.info("Scanner stopped");
        }
        Ok(())
    }
}

/// Parse one helper stdout line of the form "address payload-hex"
fn parse_helper_line(line: &str) -> Option<Advertisement> {
    let mut parts = line.split_whitespace();
    let address = parts.next()?;
    let payload = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Advertisement {
        address: address.to_string(),
        payload: payload.to_string(),
    })
}
