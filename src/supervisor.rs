//! Scan scheduling and liveness supervision for Lampyris
//!
//! This module contains the main supervisor state machine that coordinates
//! scanning, storage, enrichment and upload. One cooperative loop drains
//! advertisements in bounded cycles, runs enrichment and upload at fixed
//! wall-clock boundaries, and requests a process restart when the beacon
//! falls silent for too many consecutive cycles.

use crate::advert::{MANUFACTURER_TAG, decode_advertisement};
use crate::carbon::{self, IntensityProvider};
use crate::config::Config;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::scan::{Advertisement, ScanTransport};
use crate::store::ReadingStore;
use crate::upload::Uploader;
use chrono::{DateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Wall-clock minutes at which enrichment and upload run
const BOUNDARY_MINUTES: [u32; 4] = [0, 15, 30, 45];

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Draining advertisements from the scan transport
    Scanning,
    /// Running the boundary enrichment and upload work
    EnrichingAndUploading,
    /// Watchdog tripped; a process restart has been requested
    Restarting,
}

/// How the supervisor loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Clean shutdown was requested
    Shutdown,
    /// The watchdog requested a full process restart
    Restart,
}

/// Main supervisor for Lampyris
pub struct MeterSupervisor {
    /// Configuration
    config: Config,

    /// Readings store
    store: ReadingStore,

    /// Scan transport
    transport: Box<dyn ScanTransport>,

    /// Intensity provider, absent when enrichment is disabled
    provider: Option<Box<dyn IntensityProvider>>,

    /// Remote collector client
    uploader: Uploader,

    /// Logger with context
    logger: StructuredLogger,

    /// Current scheduler state
    state: SupervisorState,

    /// Consecutive scan cycles without a successfully stored reading
    empty_cycles: u32,

    /// Whether boundary work already ran during the current boundary minute
    boundary_done: bool,

    /// Total scan cycles driven since startup
    total_cycles: u64,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,

    /// Shutdown receiver
    shutdown_rx: mpsc::UnboundedReceiver<()>,
}

impl MeterSupervisor {
    /// Create a supervisor from pre-built components
    pub fn new(
        config: Config,
        store: ReadingStore,
        transport: Box<dyn ScanTransport>,
        provider: Option<Box<dyn IntensityProvider>>,
        uploader: Uploader,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let logger = get_logger("supervisor");

        Self {
            config,
            store,
            transport,
            provider,
            uploader,
            logger,
            state: SupervisorState::Scanning,
            empty_cycles: 0,
            boundary_done: false,
            total_cycles: 0,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Create a supervisor with production components from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let store = ReadingStore::open_file(&config.storage.db_path)?;
        let transport = Box::new(crate::scan::HelperScan::new(&config.scan));
        let provider: Option<Box<dyn IntensityProvider>> = if config.intensity.enabled {
            Some(Box::new(carbon::CarbonIntensityClient::new(
                &config.intensity,
            )?))
        } else {
            None
        };
        let uploader = Uploader::new(&config.upload)?;

        Ok(Self::new(config, store, transport, provider, uploader))
    }

    /// Current scheduler state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Consecutive empty cycles observed so far
    pub fn empty_cycles(&self) -> u32 {
        self.empty_cycles
    }

    /// Sender that requests a clean shutdown of the run loop
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the supervisor main loop until shutdown or a restart request
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.logger.info(&format!(
            "Starting supervisor for beacon {} ({} imp/kWh)",
            self.config.device.address, self.config.device.imp_per_kwh
        ));

        let mut events = self.transport.start().await?;
        let window = Duration::from_secs(self.config.scan.window_seconds);

        'supervise: loop {
            self.state = SupervisorState::Scanning;
            self.total_cycles = self.total_cycles.saturating_add(1);

            let deadline = Instant::now() + window;
            let mut accepted = 0u32;
            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Some(advert) => {
                                if self.handle_advertisement(&advert).await {
                                    accepted += 1;
                                }
                            }
                            None => {
                                // Scanner output ended; run out the cycle so the
                                // stall counter keeps its once-per-cycle cadence
                                tokio::select! {
                                    _ = tokio::time::sleep_until(deadline) => {}
                                    _ = self.shutdown_rx.recv() => {
                                        self.logger.info("Shutdown signal received");
                                        break 'supervise;
                                    }
                                }
                                break;
                            }
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = self.shutdown_rx.recv() => {
                        self.logger.info("Shutdown signal received");
                        break 'supervise;
                    }
                }
            }

            self.logger.debug(&format!(
                "Scan cycle {} complete: accepted={} empty_cycles={}",
                self.total_cycles, accepted, self.empty_cycles
            ));

            if self.cycle_watchdog_tripped(accepted) {
                self.state = SupervisorState::Restarting;
                self.logger.error(&format!(
                    "No readings stored for {} consecutive scan cycles, requesting restart",
                    self.empty_cycles
                ));
                if let Err(e) = self.transport.stop().await {
                    self.logger
                        .warn(&format!("Scanner stop failed during restart: {}", e));
                }
                return Ok(RunOutcome::Restart);
            }

            let minute = Utc::now().minute();
            if self.should_run_boundary(minute) {
                self.state = SupervisorState::EnrichingAndUploading;
                self.enrich_and_upload().await;
            }
        }

        if let Err(e) = self.transport.stop().await {
            self.logger
                .warn(&format!("Scanner stop failed during shutdown: {}", e));
        }
        self.logger.info("Supervisor stopped");
        Ok(RunOutcome::Shutdown)
    }

    /// Validate, decode and store one advertisement
    ///
    /// Returns true only when a reading was stored; every rejection or
    /// failure is non-fatal to the loop.
    async fn handle_advertisement(&mut self, advert: &Advertisement) -> bool {
        if !advert
            .address
            .eq_ignore_ascii_case(&self.config.device.address)
        {
            return false;
        }

        if !advert.payload.starts_with(MANUFACTURER_TAG) {
            self.logger.debug(&format!(
                "Ignoring payload without meter tag from {}",
                advert.address
            ));
            return false;
        }

        let reading = match decode_advertisement(&advert.payload, self.config.device.imp_per_kwh) {
            Ok(reading) => reading,
            Err(e) => {
                self.logger.warn(&format!("Dropping advertisement: {}", e));
                return false;
            }
        };

        let timestamp = truncate_to_minute(Utc::now());
        if let Err(e) = self.store.insert(timestamp, &reading) {
            self.logger.error(&format!("Failed to store reading: {}", e));
            return false;
        }

        self.logger.debug(&format!(
            "Reading accepted: battery={}% total={:.3}kWh rate={:.3}kW",
            reading.battery, reading.cumulative_kwh, reading.rate_kw
        ));
        self.uploader.post_live_kw(reading.rate_kw).await;
        true
    }

    /// Update the stall counter after a cycle; true when the watchdog trips
    fn cycle_watchdog_tripped(&mut self, accepted: u32) -> bool {
        if accepted > 0 {
            self.empty_cycles = 0;
            return false;
        }
        self.empty_cycles += 1;
        self.empty_cycles >= self.config.scan.max_empty_cycles
    }

    /// Decide whether boundary work should run for the given wall-clock minute
    ///
    /// The done flag latches for the duration of one boundary minute and
    /// releases as soon as the minute leaves the boundary set.
    fn should_run_boundary(&mut self, minute: u32) -> bool {
        if !BOUNDARY_MINUTES.contains(&minute) {
            self.boundary_done = false;
            return false;
        }
        if self.boundary_done {
            return false;
        }
        self.boundary_done = true;
        true
    }

    /// Run one enrichment pass followed by a full export upload
    async fn enrich_and_upload(&mut self) {
        if let Some(provider) = self.provider.as_deref() {
            if let Err(e) = carbon::reconcile(&self.store, provider).await {
                self.logger
                    .warn(&format!("Enrichment pass skipped: {}", e));
            }
        }

        if self.uploader.is_enabled() {
            match self.store.export_all() {
                Ok(rows) => {
                    if let Err(e) = self.uploader.upload_readings(&rows).await {
                        self.logger
                            .warn(&format!("Upload failed, will retry next boundary: {}", e));
                    }
                }
                Err(e) => {
                    self.logger.error(&format!("Export failed: {}", e));
                }
            }
        }
    }
}

/// Zero out seconds and sub-seconds so sightings coalesce per minute
fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}
