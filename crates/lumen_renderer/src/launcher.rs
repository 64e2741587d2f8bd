//! Task launcher: waves of indexed tasks on a fixed worker pool.
//!
//! A wave runs one task per index in a range (a scanline, a vertex batch)
//! on a rayon pool sized to the machine. The owner polls the wave without
//! blocking (`num_finished() == num_pending()`), collects results with
//! `pop_all`, and only then starts the next wave. Cancellation is
//! cooperative: tasks receive the shared stop flag and are expected to
//! check it between units of work.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{RenderError, RenderResult};

/// Shared state of one wave.
struct Wave<R> {
    begin: usize,
    slots: Vec<Mutex<Option<R>>>,
    finished: AtomicUsize,
    done_lock: Mutex<()>,
    done: Condvar,
}

impl<R> Wave<R> {
    fn is_complete(&self) -> bool {
        self.finished.load(Ordering::Acquire) == self.slots.len()
    }
}

/// Marks a task finished even if it unwinds.
struct FinishGuard<R>(Arc<Wave<R>>);

impl<R> Drop for FinishGuard<R> {
    fn drop(&mut self) {
        let wave = &self.0;
        let finished = wave.finished.fetch_add(1, Ordering::AcqRel) + 1;
        if finished == wave.slots.len() {
            let _guard = wave.done_lock.lock();
            wave.done.notify_all();
        }
    }
}

/// Runs waves of tasks producing one `R` per index.
pub struct TaskLauncher<R: Send + 'static> {
    pool: ThreadPool,
    cancel: Arc<AtomicBool>,
    wave: Option<Arc<Wave<R>>>,
}

impl<R: Send + 'static> TaskLauncher<R> {
    /// Pool with one worker per logical CPU.
    pub fn new() -> RenderResult<Self> {
        Self::with_threads(num_cpus::get())
    }

    /// Pool with an explicit worker count (at least one).
    pub fn with_threads(num_threads: usize) -> RenderResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("lumen-worker-{}", i))
            .panic_handler(|_| log::error!("Render task panicked"))
            .build()
            .map_err(|e| RenderError::ThreadPool(e.to_string()))?;

        log::debug!("Task launcher using {} threads", pool.current_num_threads());

        Ok(Self {
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
            wave: None,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start one task per index in `range`.
    ///
    /// Any wave still in flight is cancelled and drained first. Each task
    /// gets its index and the stop flag; a task that sees the flag set
    /// should return promptly, its result is discarded.
    pub fn launch<F>(&mut self, range: Range<usize>, task: F)
    where
        F: Fn(usize, &AtomicBool) -> R + Send + Sync + 'static,
    {
        self.stop();
        self.cancel.store(false, Ordering::Release);

        let wave = Arc::new(Wave {
            begin: range.start,
            slots: range.clone().map(|_| Mutex::new(None)).collect(),
            finished: AtomicUsize::new(0),
            done_lock: Mutex::new(()),
            done: Condvar::new(),
        });
        let task = Arc::new(task);

        for index in range {
            let wave = Arc::clone(&wave);
            let task = Arc::clone(&task);
            let cancel = Arc::clone(&self.cancel);

            self.pool.spawn(move || {
                let guard = FinishGuard(wave);
                if cancel.load(Ordering::Acquire) {
                    return;
                }
                let result = task(index, &cancel);
                if !cancel.load(Ordering::Acquire) {
                    *guard.0.slots[index - guard.0.begin].lock() = Some(result);
                }
            });
        }

        self.wave = Some(wave);
    }

    /// Tasks in the current wave (finished or not).
    pub fn num_pending(&self) -> usize {
        self.wave.as_ref().map_or(0, |w| w.slots.len())
    }

    /// Tasks of the current wave that have returned.
    pub fn num_finished(&self) -> usize {
        self.wave
            .as_ref()
            .map_or(0, |w| w.finished.load(Ordering::Acquire))
    }

    /// True when there is a wave and all its tasks have returned.
    pub fn is_finished(&self) -> bool {
        self.wave.as_ref().is_some_and(|w| w.is_complete())
    }

    /// True while a wave has unfinished tasks.
    pub fn is_busy(&self) -> bool {
        self.wave.as_ref().is_some_and(|w| !w.is_complete())
    }

    /// Take the results that are ready, in index order.
    ///
    /// Once the whole wave has finished it is cleared, so `num_pending`
    /// drops to zero.
    pub fn pop_all(&mut self) -> Vec<(usize, R)> {
        let Some(wave) = &self.wave else {
            return Vec::new();
        };

        // Checked before the scan: a slot is filled before its task counts
        // as finished, so a wave complete here has nothing left to land.
        let complete = wave.is_complete();
        let results = wave
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.lock().take().map(|r| (wave.begin + i, r)))
            .collect();

        if complete {
            self.wave = None;
        }
        results
    }

    /// Block until the current wave has finished.
    pub fn wait(&self) {
        let Some(wave) = &self.wave else {
            return;
        };
        let mut guard = wave.done_lock.lock();
        while !wave.is_complete() {
            wave.done.wait(&mut guard);
        }
    }

    /// Shared stop flag handed to tasks.
    pub fn cancel_flag(&self) -> &Arc<AtomicBool> {
        &self.cancel
    }

    /// Request cancellation, drain in-flight tasks and drop their results.
    pub fn stop(&mut self) {
        if self.wave.is_none() {
            return;
        }
        self.cancel.store(true, Ordering::Release);
        self.wait();
        self.wave = None;
    }
}

impl<R: Send + 'static> Drop for TaskLauncher<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wave_results_in_order() {
        let mut launcher = TaskLauncher::with_threads(4).unwrap();
        launcher.launch(10..20, |i, _| i * i);
        assert_eq!(launcher.num_pending(), 10);

        launcher.wait();
        assert!(launcher.is_finished());
        assert_eq!(launcher.num_finished(), launcher.num_pending());

        let results = launcher.pop_all();
        let expected: Vec<(usize, usize)> = (10..20).map(|i| (i, i * i)).collect();
        assert_eq!(results, expected);
        assert_eq!(launcher.num_pending(), 0);
        assert!(!launcher.is_finished());
    }

    #[test]
    fn test_non_blocking_poll() {
        let mut launcher = TaskLauncher::with_threads(2).unwrap();
        launcher.launch(0..8, |i, _| {
            std::thread::sleep(Duration::from_millis(5));
            i
        });

        let mut collected = Vec::new();
        while launcher.num_pending() > 0 {
            collected.extend(launcher.pop_all());
            std::thread::sleep(Duration::from_millis(1));
        }
        collected.sort();
        assert_eq!(collected, (0..8).map(|i| (i, i)).collect::<Vec<_>>());
    }

    #[test]
    fn test_tight_polling_keeps_every_result() {
        for _ in 0..20 {
            let mut launcher = TaskLauncher::with_threads(3).unwrap();
            launcher.launch(0..200, |i, _| i);

            let mut collected = Vec::new();
            while launcher.num_pending() > 0 {
                collected.extend(launcher.pop_all());
            }
            assert_eq!(collected.len(), 200);
        }
    }

    #[test]
    fn test_stop_drains_and_discards() {
        let mut launcher = TaskLauncher::with_threads(2).unwrap();
        launcher.launch(0..64, |i, cancel: &AtomicBool| {
            for _ in 0..100 {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            i
        });

        launcher.stop();
        assert_eq!(launcher.num_pending(), 0);
        assert!(launcher.pop_all().is_empty());
        assert!(!launcher.is_busy());
    }

    #[test]
    fn test_relaunch_supersedes() {
        let mut launcher = TaskLauncher::with_threads(2).unwrap();
        launcher.launch(0..4, |_, _| {
            std::thread::sleep(Duration::from_millis(10));
            "old"
        });
        launcher.launch(0..2, |_, _| "new");
        launcher.wait();

        let results = launcher.pop_all();
        assert_eq!(results, vec![(0, "new"), (1, "new")]);
    }

    #[test]
    fn test_empty_wave() {
        let mut launcher: TaskLauncher<u32> = TaskLauncher::with_threads(1).unwrap();
        launcher.launch(0..0, |_, _| 1);
        launcher.wait();
        assert!(launcher.is_finished());
        assert!(launcher.pop_all().is_empty());
        assert_eq!(launcher.num_pending(), 0);
    }
}
