//! `ferry upload`: send files through the transfer queue.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use ferry_core::{Event, EventName, EventSpec, QueueConfig, UnitStatus};
use ferry_queue::{TransferManager, TransferManagerDeps, build_transfer_manager};

use super::files;
use crate::error::CliError;
use crate::http_unit::HttpUnitFactory;
use crate::presentation::{self, NAMESPACE, UploadReporter};

/// Arguments for the upload command.
pub struct UploadArgs {
    pub files: Vec<PathBuf>,
    pub endpoint: Url,
    pub json: bool,
}

pub async fn execute(config: QueueConfig, args: UploadArgs) -> Result<(), CliError> {
    let files = files::resolve(&args.files).await?;
    let total = files.len();

    let factory = HttpUnitFactory::new(
        args.endpoint,
        Handle::current(),
        files
            .iter()
            .map(|f| (f.candidate.name.clone(), f.path.clone())),
    );
    let manager = build_transfer_manager(TransferManagerDeps::new(config, Arc::new(factory)));

    let reporter = UploadReporter::new();
    if args.json {
        presentation::attach_json(&manager)?;
    } else {
        reporter.attach(&manager)?;
    }
    let done = watch_for_end(&manager)?;

    manager.add_files(files.into_iter().map(|f| f.candidate));
    manager.start_upload();

    tokio::select! {
        () = done.notified() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::warn!("Interrupted; stopping active transfers");
            manager.stop_all();
            if !args.json {
                reporter.finish(count_uploaded(&manager), total);
            }
            return Err(CliError::Interrupted);
        }
    }

    let uploaded = count_uploaded(&manager);
    if !args.json {
        reporter.finish(uploaded, total);
    }
    if uploaded < total {
        return Err(CliError::Incomplete {
            failed: total - uploaded,
            total,
        });
    }
    Ok(())
}

/// Notified on `finish`, or on `error` when the run never started.
fn watch_for_end(manager: &TransferManager) -> Result<Arc<Notify>, CliError> {
    let done = Arc::new(Notify::new());
    for name in [EventName::Finish, EventName::Error] {
        let done = Arc::clone(&done);
        manager.on(EventSpec::namespaced(name, NAMESPACE), move |_: &Event| {
            done.notify_one();
        })?;
    }
    Ok(done)
}

fn count_uploaded(manager: &TransferManager) -> usize {
    manager
        .units()
        .iter()
        .filter(|unit| unit.status == UnitStatus::Done)
        .count()
}
