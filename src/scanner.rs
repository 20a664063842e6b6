//! Background scan thread with connection retry

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::ScanConfig;
use crate::inventory::Inventory;
use crate::mux::Multiplexer;
use crate::scheduler::{ScanScheduler, SensorReadings, StopToken};
use crate::snapshot::Published;
use crate::transport::ReaderTransport;
use crate::types::ScanError;

/// Granularity of interruptible waits
const STOP_POLL: Duration = Duration::from_millis(50);

/// Handle to a running scan thread
#[derive(Debug)]
pub struct ScannerHandle {
    inventory: Published<Inventory>,
    temperatures: Published<SensorReadings>,
    stop: StopToken,
    thread: JoinHandle<()>,
}

impl ScannerHandle {
    pub fn inventory(&self) -> &Published<Inventory> {
        &self.inventory
    }

    pub fn temperatures(&self) -> &Published<SensorReadings> {
        &self.temperatures
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Request a stop and wait for the scan thread to exit.
    pub fn stop(self) -> thread::Result<()> {
        self.stop.stop();
        self.thread.join()
    }
}

/// Starts the scan loop on its own thread.
pub struct Scanner;

impl Scanner {
    /// Spawn the scan thread.
    ///
    /// The thread retries `connect` every `reconnect_interval` until the
    /// reader reports a connection, configures it, then sweeps until stopped.
    /// Connecting and scanning run on the same thread, so they never use the
    /// reader at the same time.
    pub fn spawn<R, M>(reader: R, mux: M, config: ScanConfig) -> Result<ScannerHandle, ScanError>
    where
        R: ReaderTransport + Send + 'static,
        M: Multiplexer + Send + 'static,
    {
        let mut scheduler = ScanScheduler::new(reader, mux, config)?;
        let inventory = scheduler.inventory();
        let temperatures = scheduler.temperatures();
        let stop = StopToken::new();
        let thread_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("shelf-scan".into())
            .spawn(move || {
                let interval = scheduler.config().reconnect_interval;
                if !connect_with_retry(scheduler.reader_mut(), interval, &thread_stop) {
                    return;
                }
                if let Err(e) = scheduler.configure() {
                    error!("Reader setup failed, not scanning: {}", e);
                    return;
                }
                scheduler.run(&thread_stop);
            })
            .map_err(|e| ScanError::Transport(format!("Failed to spawn scan thread: {}", e)))?;

        Ok(ScannerHandle {
            inventory,
            temperatures,
            stop,
            thread,
        })
    }
}

/// Try to connect every `interval` until connected; `false` if stopped first.
pub fn connect_with_retry<R: ReaderTransport>(
    reader: &mut R,
    interval: Duration,
    stop: &StopToken,
) -> bool {
    let mut attempt = 0u32;

    while !stop.is_stopped() {
        attempt += 1;
        info!("Connecting reader. Attempt #{}", attempt);

        if let Err(e) = reader.connect() {
            warn!("Error connecting to reader: {:?}", e);
        }

        if reader.is_connected() {
            info!("Reader connected after {} attempt(s)", attempt);
            return true;
        }

        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            if stop.is_stopped() {
                return false;
            }
            thread::sleep(STOP_POLL.min(interval));
        }
    }

    false
}
