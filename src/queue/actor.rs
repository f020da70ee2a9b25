use super::{PlaybackQueue, QueueSnapshot};
use crate::error::QueueError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Outcome of a cursor move, captured together with the resulting current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult<T> {
    pub moved: bool,
    pub current: Option<T>,
}

enum Command<T> {
    Next(oneshot::Sender<StepResult<T>>),
    StepBackward(oneshot::Sender<StepResult<T>>),
    Restart(oneshot::Sender<()>),
    Add(Vec<T>, oneshot::Sender<usize>),
    Snapshot(oneshot::Sender<QueueSnapshot<T>>),
}

/// Cloneable handle to a queue owned by its own task.
///
/// Every mutation goes through one task, so a list append and the matching
/// shuffle-index growth are observed together or not at all.
pub struct QueueHandle<T> {
    tx: mpsc::Sender<Command<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// Move `queue` into a new task. Must be called inside a tokio runtime.
/// The task exits once every handle is dropped.
pub fn spawn_queue<T>(queue: PlaybackQueue<T>) -> QueueHandle<T>
where
    T: Clone + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Command<T>>(64);

    tokio::spawn(async move {
        let mut queue = queue;
        while let Some(command) = rx.recv().await {
            match command {
                Command::Next(reply) => {
                    let moved = queue.next();
                    let _ = reply.send(StepResult {
                        moved,
                        current: queue.current_file().cloned(),
                    });
                }
                Command::StepBackward(reply) => {
                    let moved = queue.step_backward();
                    let _ = reply.send(StepResult {
                        moved,
                        current: queue.current_file().cloned(),
                    });
                }
                Command::Restart(reply) => {
                    queue.restart();
                    let _ = reply.send(());
                }
                Command::Add(files, reply) => {
                    let added = queue.add(files);
                    debug!("Queue grew by {} to {}", added, queue.size());
                    let _ = reply.send(added);
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(queue.snapshot());
                }
            }
        }
        debug!("Queue task stopped with {} files", queue.size());
    });

    QueueHandle { tx }
}

impl<T> QueueHandle<T>
where
    T: Clone + Send + 'static,
{
    pub async fn next(&self) -> Result<StepResult<T>, QueueError> {
        self.request(Command::Next).await
    }

    pub async fn step_backward(&self) -> Result<StepResult<T>, QueueError> {
        self.request(Command::StepBackward).await
    }

    pub async fn restart(&self) -> Result<(), QueueError> {
        self.request(Command::Restart).await
    }

    pub async fn add(&self, files: Vec<T>) -> Result<usize, QueueError> {
        self.request(|reply| Command::Add(files, reply)).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot<T>, QueueError> {
        self.request(Command::Snapshot).await
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command<T>,
    ) -> Result<R, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn handle(files: Vec<u32>, mode: QueueMode) -> QueueHandle<u32> {
        spawn_queue(PlaybackQueue::with_rng(files, 0, mode, StdRng::seed_from_u64(11)))
    }

    #[tokio::test]
    async fn test_handle_walks_queue_to_exhaustion() {
        let q = handle(vec![10, 20, 30], QueueMode::default());
        assert_eq!(q.snapshot().await.unwrap().current, Some(10));

        let step = q.next().await.unwrap();
        assert!(step.moved);
        assert_eq!(step.current, Some(20));

        q.next().await.unwrap();
        let step = q.next().await.unwrap();
        assert!(!step.moved);
        assert_eq!(step.current, None);
    }

    #[tokio::test]
    async fn test_concurrent_adds_and_nexts_stay_consistent() {
        let mode = QueueMode { shuffle: true, looping: false, keep_first: true };
        let q = handle(vec![0], mode);

        let mut tasks = Vec::new();
        for batch in 0..8u32 {
            let adder = q.clone();
            tasks.push(tokio::spawn(async move {
                adder.add(vec![batch * 10 + 1, batch * 10 + 2]).await.unwrap()
            }));
            let stepper = q.clone();
            tasks.push(tokio::spawn(async move {
                stepper.next().await.unwrap();
                0
            }));
        }
        let mut added = 0;
        for task in tasks {
            added += task.await.unwrap();
        }
        assert_eq!(added, 16);

        let snap = q.snapshot().await.unwrap();
        assert_eq!(snap.len, 17);

        // replay from the top: every file is reachable exactly once
        q.restart().await.unwrap();
        let mut seen = Vec::new();
        while let Some(file) = q.next().await.unwrap().current {
            seen.push(file);
        }
        seen.sort_unstable();
        let mut expected: Vec<u32> = (0..8).flat_map(|b| [b * 10 + 1, b * 10 + 2]).collect();
        expected.push(0);
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_step_backward_through_handle() {
        let q = handle(vec![1, 2, 3], QueueMode::default());
        q.next().await.unwrap();
        let step = q.step_backward().await.unwrap();
        assert!(step.moved);
        assert_eq!(step.current, Some(1));
    }
}
