//! Bounded-concurrency coordinator: emit item outcomes as they complete.
//!
//! ## Admission
//!
//! A counting semaphore with `concurrency` permits gates the workers. The
//! dispatcher acquires a permit *before* spawning each task, so at most
//! `concurrency` tasks exist (and at most that many items are in flight) at
//! any moment. Items are admitted strictly in catalog order.
//!
//! ## Pacing
//!
//! After a task has published its outcome it keeps its permit for
//! `task_pacing` before releasing it. That spaces out admissions and keeps
//! the request rate against the vendor polite even at high concurrency.
//!
//! ## Completion
//!
//! Outcomes arrive in completion order (sort by `position` if order
//! matters). The dispatcher joins every task before it drops the last
//! sender, so the stream ends only after all N items have reported. A task
//! that panics still yields a `Failed` outcome with an internal error.

use crate::catalog::CatalogItem;
use crate::config::SyncConfig;
use crate::error::SheetError;
use crate::output::{ItemStatus, ProcessOutcome};
use crate::pipeline::process::SheetProcessor;
use crate::progress::{ProgressCallback, SyncProgressCallback};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info};

/// A boxed stream of per-item outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ProcessOutcome> + Send>>;

/// Process `items` with bounded concurrency, streaming one outcome per item.
///
/// The returned stream yields exactly `items.len()` outcomes and then ends.
/// Work starts immediately in a background task; must be called from within
/// a Tokio runtime.
pub fn sync_stream(
    items: Vec<CatalogItem>,
    processor: Arc<SheetProcessor>,
    config: &SyncConfig,
) -> OutcomeStream {
    let (tx, rx) = mpsc::channel(items.len().max(1));

    let dispatcher = Dispatcher {
        processor,
        concurrency: config.concurrency.max(1),
        pacing: config.task_pacing(),
        progress: config.progress_callback.clone(),
    };
    tokio::spawn(dispatcher.run(items, tx));

    Box::pin(ReceiverStream::new(rx))
}

struct Dispatcher {
    processor: Arc<SheetProcessor>,
    concurrency: usize,
    pacing: Duration,
    progress: Option<ProgressCallback>,
}

impl Dispatcher {
    async fn run(self, items: Vec<CatalogItem>, tx: mpsc::Sender<ProcessOutcome>) {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(
            "Dispatching {} items with concurrency {}",
            total, self.concurrency
        );

        for (idx, item) in items.into_iter().enumerate() {
            let position = idx + 1;

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let outcome = self.internal_failure(item, position, format!("admission failed: {e}"));
                    report(self.progress.as_deref(), &outcome, total);
                    let _ = tx.send(outcome).await;
                    continue;
                }
            };

            let processor = Arc::clone(&self.processor);
            let progress = self.progress.clone();
            let tx = tx.clone();
            let pacing = self.pacing;

            tasks.spawn(async move {
                if let Some(cb) = &progress {
                    cb.on_item_start(position, total, &item);
                }

                let result = AssertUnwindSafe(processor.process(&item, position, total))
                    .catch_unwind()
                    .await;
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(panic) => ProcessOutcome {
                        path: processor.output_path(&item),
                        item,
                        position,
                        status: ItemStatus::Failed {
                            error: SheetError::Internal {
                                detail: panic_message(panic.as_ref()),
                            },
                        },
                        duration_ms: 0,
                    },
                };

                report(progress.as_deref(), &outcome, total);
                if tx.send(outcome).await.is_err() {
                    debug!("Outcome receiver dropped; item {} result discarded", position);
                }

                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                drop(permit);
            });
        }

        // ── Join barrier ─────────────────────────────────────────────────
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Sheet task did not complete: {}", e);
            }
        }
        debug!("All {} sheet tasks finished", total);
        drop(tx);
    }

    fn internal_failure(&self, item: CatalogItem, position: usize, detail: String) -> ProcessOutcome {
        ProcessOutcome {
            path: self.processor.output_path(&item),
            item,
            position,
            status: ItemStatus::Failed {
                error: SheetError::Internal { detail },
            },
            duration_ms: 0,
        }
    }
}

fn report(progress: Option<&dyn SyncProgressCallback>, outcome: &ProcessOutcome, total: usize) {
    let Some(cb) = progress else {
        return;
    };
    match &outcome.status {
        ItemStatus::Failed { error } => {
            cb.on_item_error(outcome.position, total, &outcome.item, error)
        }
        status => cb.on_item_complete(
            outcome.position,
            total,
            &outcome.item,
            matches!(status, ItemStatus::Skipped),
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
