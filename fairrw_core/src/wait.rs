//! Suspension of a blocked caller.
//!
//! A blocked caller owns a clone of its queue entry and polls the entry's
//! status outside the critical section until the wake protocol flips it to
//! Running. There is no parking primitive and no timeout: a caller that is
//! never promoted spins forever.

#[cfg(feature = "trace")]
use log::trace;
use metrics::histogram;

use crate::constants::{DEFAULT_SPIN_LIMIT, METRIC_SPIN_ITERATIONS};
use crate::types::WaitEntry;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Pure busy-spin with a CPU pause hint between polls.
    #[default]
    Spin,
    /// Busy-spin, but give up the time slice every `spin_limit` polls.
    /// Burns less CPU when threads outnumber cores, at the cost of a
    /// slightly later observation of the wake.
    SpinThenYield { spin_limit: u32 },
}

impl WaitStrategy {
    pub fn spin_then_yield() -> Self {
        WaitStrategy::SpinThenYield {
            spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }

    /// Spin until `entry` is Running. Returns the number of unsuccessful polls.
    pub fn wait_until_running(self, entry: &WaitEntry) -> u64 {
        #[cfg(feature = "trace")]
        trace!(
            "[WAIT] {} holder={} spinning ({:?})",
            entry.kind(),
            entry.holder(),
            self
        );
        let mut polls: u64 = 0;
        while !entry.is_running() {
            polls += 1;
            match self {
                WaitStrategy::Spin => core::hint::spin_loop(),
                WaitStrategy::SpinThenYield { spin_limit } => {
                    if spin_limit == 0 || polls % u64::from(spin_limit) == 0 {
                        std::thread::yield_now();
                    } else {
                        core::hint::spin_loop();
                    }
                }
            }
        }
        histogram!(METRIC_SPIN_ITERATIONS).record(polls as f64);
        #[cfg(feature = "trace")]
        trace!(
            "[WAIT] {} holder={} running after {} polls",
            entry.kind(),
            entry.holder(),
            polls
        );
        polls
    }
}
