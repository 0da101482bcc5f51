//! Transfer units driven by the test body.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferry_queue::{
    FileCandidate, TransferOutcome, TransferUnit, UnitFactory, UnitHandle, UnitId,
};

/// A unit that parks its handle until the test finishes it.
#[derive(Default)]
pub struct ManualUnit {
    handle: Mutex<Option<UnitHandle>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    /// When set, `stop` reports `Stopped` right away.
    report_on_stop: bool,
}

impl ManualUnit {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Take the handle of the current activation.
    pub fn take_handle(&self) -> UnitHandle {
        self.handle
            .lock()
            .unwrap()
            .take()
            .expect("unit has not been started")
    }

    pub fn finish(&self, outcome: TransferOutcome) {
        self.take_handle().finish(outcome);
    }

    pub fn progress(&self, loaded: u64) {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .expect("unit has not been started")
            .progress(loaded);
    }
}

impl TransferUnit for ManualUnit {
    fn start(&self, handle: UnitHandle) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.report_on_stop {
            let handle = self.handle.lock().unwrap().take();
            if let Some(handle) = handle {
                handle.finish(TransferOutcome::Stopped);
            }
        }
    }
}

/// Creates [`ManualUnit`]s and keeps them reachable by id.
#[derive(Default)]
pub struct ManualFactory {
    units: Mutex<HashMap<UnitId, Arc<ManualUnit>>>,
    report_on_stop: bool,
}

impl ManualFactory {
    /// Factory whose units report `Stopped` as soon as they are stopped.
    pub fn reporting_on_stop() -> Self {
        Self {
            report_on_stop: true,
            ..Self::default()
        }
    }

    pub fn unit(&self, id: UnitId) -> Arc<ManualUnit> {
        Arc::clone(
            self.units
                .lock()
                .unwrap()
                .get(&id)
                .expect("unit was created"),
        )
    }

    pub fn done(&self, id: UnitId) {
        self.unit(id).finish(TransferOutcome::Done { message: None });
    }

    pub fn fail(&self, id: UnitId, message: &str) {
        self.unit(id).finish(TransferOutcome::Failed {
            message: message.to_string(),
        });
    }
}

impl UnitFactory for ManualFactory {
    fn create(&self, id: UnitId, _file: &FileCandidate) -> Arc<dyn TransferUnit> {
        let unit = Arc::new(ManualUnit {
            report_on_stop: self.report_on_stop,
            ..ManualUnit::default()
        });
        self.units.lock().unwrap().insert(id, Arc::clone(&unit));
        unit
    }
}
