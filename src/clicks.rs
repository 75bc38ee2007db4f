use futures_util::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe};
use tokio_util::task::TaskTracker;

/// Owns the background writes spawned after a redirect has already been
/// answered, so they can be counted and drained on shutdown instead of being
/// dropped. Spawning takes no lock.
#[derive(Clone, Debug, Default)]
pub struct ClickTracker {
    tasks: TaskTracker,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `fut` in the background. A panic inside it is logged.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                tracing::error!("Click write task panicked: {:?}", panic_message(&*panic));
            }
        });
    }

    /// Writes started but not yet finished.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every in-flight write to finish. New writes may be spawned
    /// again afterwards.
    pub async fn drain(&self) {
        let total = self.tasks.len();
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
        if total > 0 {
            tracing::debug!("Drained {} click write(s)", total);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    #[tokio::test]
    async fn drain_waits_for_every_task() {
        let tracker = ClickTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = done.clone();
            tracker.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tracker.pending(), 5);

        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_poison_the_tracker() {
        let tracker = ClickTracker::new();
        tracker.spawn(async { panic!("boom") });
        tracker.drain().await;

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        tracker.spawn(async move {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        tracker.drain().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn spawning_from_many_tasks_at_once_never_waits() {
        let tracker = ClickTracker::new();
        let done = Arc::new(AtomicUsize::new(0));

        let spawners: Vec<_> = (0..20)
            .map(|_| {
                let tracker = tracker.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    tracker.spawn(async move {
                        done.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for spawner in spawners {
            spawner.await.unwrap();
        }

        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }
}
