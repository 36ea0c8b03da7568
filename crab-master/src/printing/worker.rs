//! Print worker
//!
//! 调度循环只负责渲染并投递 [`PrintJob`]；实际的网络/文件写入在独立的
//! tokio 任务中完成，从不触碰 `Control`。

use crate::registry::PrinterNode;
use crab_printer::{PrintResult, Printer, PrinterTarget};
use shared::error::{AppError, AppResult, ErrorCode};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default queue depth
const DEFAULT_QUEUE: usize = 64;

/// 一次打印任务
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub printer: String,
    pub target: PrinterTarget,
    pub data: Vec<u8>,
}

impl PrintJob {
    pub fn new(printer: &PrinterNode, data: Vec<u8>) -> PrintResult<Self> {
        Ok(Self {
            printer: printer.name.clone(),
            target: printer.target()?,
            data,
        })
    }
}

/// Handle to the print worker task
pub struct PrintDispatcher {
    tx: mpsc::Sender<PrintJob>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PrintDispatcher {
    /// Spawn the worker on the current runtime
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_QUEUE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(rx, shutdown.clone()));
        Self {
            tx,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Queue a job without waiting
    pub fn submit(&self, job: PrintJob) -> AppResult<()> {
        let printer = job.printer.clone();
        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(printer = %printer, "Print job queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(AppError::with_message(
                ErrorCode::PrinterNotAvailable,
                format!("print queue full, dropped job for '{}'", printer),
            )),
            Err(TrySendError::Closed(_)) => Err(AppError::new(ErrorCode::ShutdownInProgress)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker after it drains queued jobs
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Print worker task failed");
        }
    }
}

async fn run(mut rx: mpsc::Receiver<PrintJob>, shutdown: CancellationToken) {
    tracing::info!("Print worker started");
    loop {
        tokio::select! {
            biased;
            job = rx.recv() => {
                let Some(job) = job else {
                    tracing::info!("Print channel closed, print worker stopping");
                    return;
                };
                execute(job).await;
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Print worker received shutdown signal");
                break;
            }
        }
    }

    rx.close();
    while let Some(job) = rx.recv().await {
        execute(job).await;
    }
    tracing::info!("Print worker stopped");
}

async fn execute(job: PrintJob) {
    match job.target.print(&job.data).await {
        Ok(()) => tracing::info!(printer = %job.printer, bytes = job.data.len(), "Printed"),
        Err(e) => tracing::error!(printer = %job.printer, error = %e, "Print failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PrinterKind;
    use crab_printer::PrinterModel;

    fn file_printer(path: &std::path::Path) -> PrinterNode {
        PrinterNode {
            id: 1,
            name: "spool".into(),
            host: path.to_string_lossy().into_owned(),
            port: 0,
            model: PrinterModel::Text,
            kind: PrinterKind::Report,
            persistent: true,
        }
    }

    #[tokio::test]
    async fn test_jobs_are_drained_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.txt");
        let node = file_printer(&path);

        let mut dispatcher = PrintDispatcher::spawn();
        dispatcher.submit(PrintJob::new(&node, b"one\n".to_vec()).unwrap()).unwrap();
        dispatcher.submit(PrintJob::new(&node, b"two\n".to_vec()).unwrap()).unwrap();
        dispatcher.stop().await;

        assert!(!dispatcher.is_running());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        let err = dispatcher
            .submit(PrintJob::new(&node, b"late".to_vec()).unwrap())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShutdownInProgress);
    }
}
