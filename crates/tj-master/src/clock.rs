//! The scheduling clock.
//!
//! A dedicated thread wakes every `clock_interval_ms` and pushes a tick
//! into a ring buffer. The controller drains it from its own thread, so
//! the clock only ever wakes the scheduler and never touches song state.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::ClockError;

/// Ticks buffered before the clock starts dropping them.
const TICK_BUFFER: usize = 64;

/// One clock wake-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTick {
    /// Ticks since the clock started, from 1
    pub count: u64,
}

/// Periodic tick source running on its own thread. Stops on drop.
pub struct ClockSource {
    stop_signal: Arc<AtomicBool>,
    ticks: HeapCons<ClockTick>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
    last: Option<ClockTick>,
}

impl ClockSource {
    pub fn start(interval_ms: f64) -> Result<Self, ClockError> {
        if !interval_ms.is_finite() || interval_ms <= 0.0 {
            return Err(ClockError::InvalidInterval(interval_ms));
        }
        let interval = Duration::from_secs_f64(interval_ms / 1000.0);
        let (mut producer, consumer) = HeapRb::<ClockTick>::new(TICK_BUFFER).split();
        let stop_signal = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let thread = std::thread::Builder::new()
            .name("tj-clock".into())
            .spawn(move || {
                let mut count = 0;
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(interval);
                    count += 1;
                    // A full buffer means the consumer is behind; it will
                    // catch up in a single pass anyway.
                    let _ = producer.try_push(ClockTick { count });
                }
            })
            .map_err(ClockError::Spawn)?;

        log::debug!(target: "clock", "clock started, interval {:?}", interval);
        Ok(Self {
            stop_signal,
            ticks: consumer,
            thread: Some(thread),
            interval,
            last: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consume every pending tick. Returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(tick) = self.ticks.try_pop() {
            self.last = Some(tick);
            drained += 1;
        }
        drained
    }

    /// The most recent tick drained.
    pub fn last_tick(&self) -> Option<ClockTick> {
        self.last
    }

    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            log::debug!(target: "clock", "clock stopped");
        }
    }
}

impl Drop for ClockSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_interval() {
        assert!(matches!(ClockSource::start(0.0), Err(ClockError::InvalidInterval(_))));
        assert!(matches!(ClockSource::start(f64::NAN), Err(ClockError::InvalidInterval(_))));
    }

    #[test]
    fn ticks_arrive_and_stop() {
        let mut clock = ClockSource::start(1.0).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(clock.drain() > 0);
        assert!(clock.last_tick().is_some_and(|t| t.count >= 1));

        clock.stop();
        clock.drain();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.drain(), 0);
    }
}
