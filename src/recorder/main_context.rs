use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Recorder;
use crate::config::MainContextConfig;
use crate::errors::RecorderResult;
use crate::models::{Admission, ConflictEntry, RecordEntry};

type Job = Box<dyn FnOnce(&mut dyn Recorder) + Send>;

/// The task that exclusively owns the recorder
pub struct MainContext {
    handle: RecorderHandle,
    task: JoinHandle<Box<dyn Recorder>>,
}

impl MainContext {
    pub fn spawn(mut recorder: Box<dyn Recorder>, config: &MainContextConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(config.queue_depth.max(1));

        let task = tokio::spawn(async move {
            debug!("Main context started");
            while let Some(job) = rx.recv().await {
                job(&mut *recorder);
            }
            debug!("Main context stopped");
            recorder
        });

        Self {
            handle: RecorderHandle {
                tx,
                timeout: config.timeout,
            },
            task,
        }
    }

    pub fn handle(&self) -> RecorderHandle {
        self.handle.clone()
    }

    /// Stop accepting calls and hand the recorder back.
    ///
    /// Waits until every cloned handle has been dropped.
    pub async fn shutdown(self) -> Option<Box<dyn Recorder>> {
        drop(self.handle);
        match self.task.await {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                warn!("Main context task failed: {}", e);
                None
            }
        }
    }
}

/// Cloneable access to the recorder from any task
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<Job>,
    timeout: Duration,
}

impl RecorderHandle {
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Run `f` on the main context and wait for its result.
    ///
    /// Returns `None` when the main context is gone or doesn't answer in
    /// time, in which case the host is assumed to be shutting down.
    pub async fn call<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Recorder) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |recorder: &mut dyn Recorder| {
            let _ = reply_tx.send(f(recorder));
        });

        let exchange = async {
            self.tx.send(job).await.ok()?;
            reply_rx.await.ok()
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Some(result)) => Some(result),
            Ok(None) => {
                warn!("Main context is closed, dropping recorder call");
                None
            }
            Err(_) => {
                warn!(
                    "No answer from main context after {:?}, assuming shutdown",
                    self.timeout
                );
                None
            }
        }
    }

    pub async fn records(&self) -> Option<Vec<RecordEntry>> {
        self.call(|recorder| recorder.records()).await
    }

    pub async fn admit(&self, entry: RecordEntry) -> Option<Admission> {
        self.call(move |recorder| recorder.admit(&entry)).await
    }

    pub async fn check_conflicts(&self, entry: RecordEntry) -> Option<Vec<ConflictEntry>> {
        self.call(move |recorder| recorder.check_conflicts(&entry))
            .await
            .flatten()
    }

    pub async fn time_changed(&self, entry: RecordEntry) {
        self.call(move |recorder| recorder.time_changed(&entry)).await;
    }

    pub async fn remove(&self, entry: RecordEntry) -> Option<RecorderResult<()>> {
        self.call(move |recorder| recorder.remove(&entry)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use chrono::Utc;

    #[derive(Default)]
    struct CountingRecorder {
        admitted: Vec<RecordEntry>,
    }

    impl Recorder for CountingRecorder {
        fn records(&self) -> Vec<RecordEntry> {
            self.admitted.clone()
        }

        fn admit(&mut self, entry: &RecordEntry) -> Admission {
            self.admitted.push(entry.clone());
            Admission::Accepted {
                id: RecordId(self.admitted.len() as u64),
            }
        }

        fn time_changed(&mut self, _entry: &RecordEntry) {}

        fn remove(&mut self, _entry: &RecordEntry) -> RecorderResult<()> {
            Ok(())
        }
    }

    /// Blocks the main context for longer than callers are willing to wait
    struct StuckRecorder;

    impl Recorder for StuckRecorder {
        fn records(&self) -> Vec<RecordEntry> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Vec::new()
        }

        fn admit(&mut self, _entry: &RecordEntry) -> Admission {
            Admission::Conflicts(Vec::new())
        }

        fn time_changed(&mut self, _entry: &RecordEntry) {}

        fn remove(&mut self, _entry: &RecordEntry) -> RecorderResult<()> {
            Ok(())
        }
    }

    fn config(timeout: Duration) -> MainContextConfig {
        MainContextConfig {
            timeout,
            queue_depth: 4,
        }
    }

    fn entry(name: &str) -> RecordEntry {
        let now = Utc::now();
        RecordEntry::new_owned("svc", now, now, name, "", 1)
    }

    #[tokio::test]
    async fn test_calls_are_marshaled_in_order() {
        let context = MainContext::spawn(
            Box::new(CountingRecorder::default()),
            &config(Duration::from_secs(5)),
        );
        let handle = context.handle();

        assert_eq!(handle.admit(entry("a")).await.and_then(|a| a.id()), Some(RecordId(1)));
        assert_eq!(handle.admit(entry("b")).await.and_then(|a| a.id()), Some(RecordId(2)));
        // the default probe can't tell
        assert_eq!(handle.check_conflicts(entry("c")).await, None);

        let names: Vec<String> = handle
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        drop(handle);
        let recorder = context.shutdown().await.unwrap();
        assert_eq!(recorder.records().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_yields_none() {
        let context = MainContext::spawn(Box::new(StuckRecorder), &config(Duration::from_millis(50)));
        let handle = context.handle();
        assert!(handle.records().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_context_yields_none() {
        let context = MainContext::spawn(
            Box::new(CountingRecorder::default()),
            &config(Duration::from_secs(5)),
        );
        let handle = context.handle();
        context.task.abort();
        let _ = context.task.await;
        assert!(handle.is_closed());
        assert!(handle.admit(entry("late")).await.is_none());
    }
}
