use lampyris::Config;
use lampyris::error::Result;
use lampyris::scan::{Advertisement, ScanTransport};
use lampyris::store::ReadingStore;
use lampyris::supervisor::{MeterSupervisor, RunOutcome, SupervisorState};
use lampyris::upload::Uploader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Transport that plays back a fixed set of advertisements and then stays
/// silent with the channel open
struct ScriptedScan {
    preloaded: Vec<Advertisement>,
    stopped: Arc<AtomicBool>,
    _hold: Option<mpsc::UnboundedSender<Advertisement>>,
}

impl ScriptedScan {
    fn new(preloaded: Vec<Advertisement>) -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let scan = Self {
            preloaded,
            stopped: stopped.clone(),
            _hold: None,
        };
        (scan, stopped)
    }
}

#[async_trait::async_trait]
impl ScanTransport for ScriptedScan {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Advertisement>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for advert in self.preloaded.drain(..) {
            let _ = tx.send(advert);
        }
        self._hold = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn beacon_advert(config: &Config) -> Advertisement {
    Advertisement {
        address: config.device.address.clone(),
        payload: "90056400000320190".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn silent_transport_trips_the_watchdog() {
    let config = Config::default();
    let store = ReadingStore::open_in_memory().unwrap();
    let uploader = Uploader::new(&config.upload).unwrap();
    let (scan, stopped) = ScriptedScan::new(Vec::new());

    let max_cycles = config.scan.max_empty_cycles;
    let mut supervisor =
        MeterSupervisor::new(config, store, Box::new(scan), None, uploader);

    let outcome = supervisor.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Restart);
    assert_eq!(supervisor.state(), SupervisorState::Restarting);
    assert_eq!(supervisor.empty_cycles(), max_cycles);
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn accepted_reading_restarts_the_count() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("readings.db");

    let config = Config::default();
    let store = ReadingStore::open_file(&path).unwrap();
    let uploader = Uploader::new(&config.upload).unwrap();
    let (scan, _stopped) = ScriptedScan::new(vec![beacon_advert(&config)]);

    let max_cycles = config.scan.max_empty_cycles;
    let mut supervisor =
        MeterSupervisor::new(config, store, Box::new(scan), None, uploader);

    let outcome = supervisor.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Restart);
    // The stored reading reset the stall counter, so the trip happened a
    // full threshold of cycles later
    assert_eq!(supervisor.empty_cycles(), max_cycles);
    drop(supervisor);

    let store = ReadingStore::open_file(&path).unwrap();
    let rows = store.export_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].battery, 100);
    assert!((rows[0].kw - 0.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_ends_the_loop_cleanly() {
    let config = Config::default();
    let store = ReadingStore::open_in_memory().unwrap();
    let uploader = Uploader::new(&config.upload).unwrap();
    let (scan, stopped) = ScriptedScan::new(Vec::new());

    let mut supervisor =
        MeterSupervisor::new(config, store, Box::new(scan), None, uploader);

    supervisor.shutdown_handle().send(()).unwrap();
    let outcome = supervisor.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Shutdown);
    assert!(stopped.load(Ordering::SeqCst));
}
