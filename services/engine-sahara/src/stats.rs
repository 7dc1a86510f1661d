use std::sync::atomic::{AtomicU32, Ordering};

/// Running counters, readable without the engine lock.
#[derive(Default)]
pub(crate) struct Stats {
    primed: AtomicU32,
    interrupts: AtomicU32,
    done1: AtomicU32,
    done1_busy2: AtomicU32,
    done1_done2: AtomicU32,
    errors: AtomicU32,
    faults: AtomicU32,
    unresolved: AtomicU32,
    resets: AtomicU32,
    spurious: AtomicU32,
    completed: AtomicU32,
    failed: AtomicU32,
    discarded: AtomicU32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Chains written to the accept register.
    pub primed: u32,
    pub interrupts: u32,
    pub done1: u32,
    pub done1_busy2: u32,
    pub done1_done2: u32,
    pub errors: u32,
    pub faults: u32,
    /// Faults that could not be pinned on a single chain.
    pub unresolved: u32,
    pub resets: u32,
    /// Interrupts with nothing on the hardware to attribute them to.
    pub spurious: u32,
    pub completed: u32,
    pub failed: u32,
    /// Results dropped because nobody was left to receive them.
    pub discarded: u32,
}

macro_rules! bump {
    ($name:ident) => {
        pub(crate) fn $name(&self) { self.$name.fetch_add(1, Ordering::Relaxed); }
    };
}

impl Stats {
    bump!(primed);

    bump!(interrupts);

    bump!(done1);

    bump!(done1_busy2);

    bump!(done1_done2);

    bump!(errors);

    bump!(faults);

    bump!(unresolved);

    bump!(resets);

    bump!(spurious);

    bump!(completed);

    bump!(failed);

    bump!(discarded);

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            primed: self.primed.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
            done1: self.done1.load(Ordering::Relaxed),
            done1_busy2: self.done1_busy2.load(Ordering::Relaxed),
            done1_done2: self.done1_done2.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            spurious: self.spurious.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn clear(&self) {
        for counter in [
            &self.primed,
            &self.interrupts,
            &self.done1,
            &self.done1_busy2,
            &self.done1_done2,
            &self.errors,
            &self.faults,
            &self.unresolved,
            &self.resets,
            &self.spurious,
            &self.completed,
            &self.failed,
            &self.discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_zeroes_everything() {
        let stats = Stats::default();
        stats.primed();
        stats.faults();
        stats.faults();
        assert_eq!(stats.snapshot().faults, 2);
        stats.clear();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
