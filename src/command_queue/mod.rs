
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use portable_atomic::{AtomicBool, AtomicUsize};
use tokio::sync::{mpsc, oneshot};
use waitgroup::{WaitGroup, Worker};

use crate::error::{Error, Result};

/// CommandExecutor runs the commands taken from a [`CommandQueue`], one at a
/// time and in the order they were pushed.
#[async_trait]
pub trait CommandExecutor<C, R>: Send + Sync {
    async fn execute(&self, command: C) -> Result<R>;
}

enum QueueItem<C, R> {
    Command {
        command: C,
        settle: oneshot::Sender<Result<R>>,
    },
    Barrier(Worker),
}

/// CommandQueue serializes asynchronous commands. Each pushed command is
/// settled exactly once, either with the executor's result or with
/// [`Error::ErrCommandQueueClosed`].
pub struct CommandQueue<C, R> {
    length: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    items_tx: mpsc::UnboundedSender<QueueItem<C, R>>,
}

impl<C, R> CommandQueue<C, R>
where
    C: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(executor: Weak<dyn CommandExecutor<C, R>>) -> Self {
        let length = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let (items_tx, items_rx) = mpsc::unbounded_channel();

        let (l, b, c) = (Arc::clone(&length), Arc::clone(&busy), Arc::clone(&closed));
        tokio::spawn(async move {
            CommandQueue::start(executor, items_rx, l, b, c).await;
        });

        CommandQueue {
            length,
            busy,
            closed,
            items_tx,
        }
    }

    /// push enqueues the command right away and returns a future resolving
    /// with its result. Commands execute in push order regardless of when
    /// the returned futures are awaited.
    pub fn push(&self, command: C) -> impl Future<Output = Result<R>> + Send + 'static {
        let (settle_tx, settle_rx) = oneshot::channel();

        self.length.fetch_add(1, Ordering::SeqCst);
        if self
            .items_tx
            .send(QueueItem::Command {
                command,
                settle: settle_tx,
            })
            .is_err()
        {
            self.length.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            match settle_rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::ErrCommandQueueClosed),
            }
        }
    }

    /// close makes every command not yet settled fail with
    /// ErrCommandQueueClosed. A command already executing is left to finish
    /// but its result is discarded.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// is_busy reports whether a command is being executed.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// is_empty checks if there are commands waiting or executing
    pub fn is_empty(&self) -> bool {
        self.length.load(Ordering::SeqCst) == 0
    }

    pub fn len(&self) -> usize {
        self.length.load(Ordering::SeqCst)
    }

    /// done blocks until all currently enqueued commands are settled.
    pub async fn done(&self) {
        let wg = WaitGroup::new();
        if self.items_tx.send(QueueItem::Barrier(wg.worker())).is_err() {
            return;
        }
        wg.wait().await;
    }

    async fn start(
        executor: Weak<dyn CommandExecutor<C, R>>,
        mut items_rx: mpsc::UnboundedReceiver<QueueItem<C, R>>,
        length: Arc<AtomicUsize>,
        busy: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(item) = items_rx.recv().await {
            let (command, settle) = match item {
                QueueItem::Command { command, settle } => (command, settle),
                QueueItem::Barrier(worker) => {
                    drop(worker);
                    continue;
                }
            };

            busy.store(true, Ordering::SeqCst);
            let result = CommandQueue::run(&executor, command, &closed).await;
            length.fetch_sub(1, Ordering::SeqCst);

            if settle.send(result).is_err() {
                log::trace!("command settled after its caller went away");
            }

            if length.load(Ordering::SeqCst) == 0 {
                busy.store(false, Ordering::SeqCst);
            }
        }

        log::trace!("command queue worker exited");
    }

    async fn run(
        executor: &Weak<dyn CommandExecutor<C, R>>,
        command: C,
        closed: &Arc<AtomicBool>,
    ) -> Result<R> {
        if closed.load(Ordering::SeqCst) {
            return Err(Error::ErrCommandQueueClosed);
        }

        let executor = match executor.upgrade() {
            Some(executor) => executor,
            None => return Err(Error::ErrCommandQueueClosed),
        };

        // A panicking executor must not take the worker down with it.
        let result = match tokio::spawn(async move { executor.execute(command).await }).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                log::error!("command execution panicked");
                Err(Error::ErrCommandPanicked)
            }
            Err(_) => Err(Error::ErrCommandQueueClosed),
        };

        if closed.load(Ordering::SeqCst) {
            log::debug!("command queue closed while executing, discarding result");
            return Err(Error::ErrCommandQueueClosed);
        }

        result
    }
}
