//! Cooperative periodic scheduler.
//!
//! A fixed table of up to sixteen `(job, period, next_deadline)` slots
//! driven from the supervisor tick. Deadlines advance by whole periods
//! rather than from the firing time, so cadence is preserved under tick
//! jitter. Jobs are plain function pointers over a caller-supplied context;
//! the table itself never blocks and never re-enters.

use heapless::Vec;

use fsw_shared::error::{FswError, Result};

/// Maximum number of scheduled jobs.
pub const MAX_JOBS: usize = 16;

/// A scheduled job over context `Ctx`.
pub type JobFn<Ctx> = fn(&Ctx);

struct Slot<Ctx: 'static> {
    job: JobFn<Ctx>,
    period_ms: u32,
    next_deadline_ms: u32,
}

// Manual impls: function pointers are Copy for any Ctx, and the derive
// machinery would demand Ctx bounds the scheduler does not need.
impl<Ctx> Clone for Slot<Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Ctx> Copy for Slot<Ctx> {}

/// The periodic scheduler.
pub struct Scheduler<Ctx: 'static> {
    slots: [Option<Slot<Ctx>>; MAX_JOBS],
    now_ms: u32,
    in_step: bool,
    fired_total: u32,
}

impl<Ctx> core::fmt::Debug for Scheduler<Ctx> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.slots.iter().flatten().count())
            .field("now_ms", &self.now_ms)
            .field("fired_total", &self.fired_total)
            .finish_non_exhaustive()
    }
}

impl<Ctx> Scheduler<Ctx> {
    /// Create an empty scheduler with its clock at zero.
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_JOBS],
            now_ms: 0,
            in_step: false,
            fired_total: 0,
        }
    }

    /// Register a job. Fails with `InvalidParam` on a zero period and
    /// `NoMemory` on a full table. Returns the slot id.
    ///
    /// Jobs fire in registration order within a step.
    pub fn register(&mut self, job: JobFn<Ctx>, period_ms: u32) -> Result<u8> {
        if period_ms == 0 {
            return Err(FswError::InvalidParam);
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Slot {
                    job,
                    period_ms,
                    next_deadline_ms: self.now_ms.wrapping_add(period_ms),
                });
                return Ok(i as u8);
            }
        }
        Err(FswError::NoMemory)
    }

    /// Change the period of a registered job. The next deadline is
    /// rebased on the current scheduler time.
    pub fn set_period(&mut self, id: u8, period_ms: u32) -> Result<()> {
        if period_ms == 0 {
            return Err(FswError::InvalidParam);
        }
        let slot = self
            .slots
            .get_mut(id as usize)
            .and_then(|s| s.as_mut())
            .ok_or(FswError::NotFound)?;
        slot.period_ms = period_ms;
        slot.next_deadline_ms = self.now_ms.wrapping_add(period_ms);
        Ok(())
    }

    /// Scheduler-local milliseconds advanced so far.
    pub const fn now_ms(&self) -> u32 {
        self.now_ms
    }

    /// Total job firings since boot.
    pub const fn fired_total(&self) -> u32 {
        self.fired_total
    }

    /// Advance time and collect the jobs due on this step without running
    /// them. Each due slot fires at most once per step and its deadline
    /// advances by one whole period.
    ///
    /// The caller runs the returned jobs after releasing the scheduler
    /// lock, keeping job execution outside the table's critical section.
    pub fn advance(
        &mut self,
        elapsed_ms: u32,
    ) -> Result<Vec<JobFn<Ctx>, MAX_JOBS>> {
        if self.in_step {
            return Err(FswError::Busy);
        }
        self.now_ms = self.now_ms.wrapping_add(elapsed_ms);

        let mut due = Vec::new();
        for slot in self.slots.iter_mut().flatten() {
            let overdue = self.now_ms.wrapping_sub(slot.next_deadline_ms);
            // Wrap-agnostic "now >= deadline": the difference is small and
            // positive when due, enormous when the deadline is ahead.
            if overdue < u32::MAX / 2 {
                slot.next_deadline_ms =
                    slot.next_deadline_ms.wrapping_add(slot.period_ms);
                self.fired_total = self.fired_total.saturating_add(1);
                let _ = due.push(slot.job);
            }
        }
        Ok(due)
    }

    /// Advance time and run the due jobs in place. Fails with `Busy` if a
    /// step is already in progress (a job must not call back into `step`).
    pub fn step(&mut self, elapsed_ms: u32, ctx: &Ctx) -> Result<u8> {
        let due = self.advance(elapsed_ms)?;
        self.in_step = true;
        for job in &due {
            job(ctx);
        }
        self.in_step = false;
        Ok(due.len() as u8)
    }
}

impl<Ctx> Default for Scheduler<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Counters {
        a: Cell<u32>,
        b: Cell<u32>,
    }

    fn bump_a(c: &Counters) {
        c.a.set(c.a.get() + 1);
    }

    fn bump_b(c: &Counters) {
        c.b.set(c.b.get() + 1);
    }

    #[test]
    fn test_n_steps_fire_n_times() {
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();
        sched.register(bump_a, 100).expect("slot free");

        for _ in 0..25 {
            sched.step(100, &counters).expect("not re-entered");
        }
        assert_eq!(counters.a.get(), 25);
    }

    #[test]
    fn test_job_not_due_before_period() {
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();
        sched.register(bump_a, 100).expect("slot free");

        sched.step(99, &counters).expect("steps");
        assert_eq!(counters.a.get(), 0);
        sched.step(1, &counters).expect("steps");
        assert_eq!(counters.a.get(), 1);
    }

    #[test]
    fn test_cadence_preserved_under_jitter() {
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();
        sched.register(bump_a, 100).expect("slot free");

        // Fire late once; deadlines stay on the 100 ms grid
        sched.step(150, &counters).expect("steps");
        assert_eq!(counters.a.get(), 1);
        // Next deadline is 200, not 250
        sched.step(50, &counters).expect("steps");
        assert_eq!(counters.a.get(), 2);
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut sched: Scheduler<Counters> = Scheduler::new();
        assert_eq!(sched.register(bump_a, 0), Err(FswError::InvalidParam));
    }

    #[test]
    fn test_table_capacity() {
        let mut sched: Scheduler<Counters> = Scheduler::new();
        for _ in 0..MAX_JOBS {
            sched.register(bump_a, 10).expect("slot free");
        }
        assert_eq!(sched.register(bump_a, 10), Err(FswError::NoMemory));
    }

    #[test]
    fn test_registration_order_is_firing_order() {
        // Both due on the same step; `a` registered first must fire first.
        // Observed through a shared cell that records the first firing.
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();

        fn first_wins_a(c: &Counters) {
            if c.b.get() == 0 {
                c.a.set(c.a.get() + 1);
            }
        }
        fn first_wins_b(c: &Counters) {
            c.b.set(c.b.get() + 1);
        }

        sched.register(first_wins_a, 10).expect("slot free");
        sched.register(first_wins_b, 10).expect("slot free");
        sched.step(10, &counters).expect("steps");
        assert_eq!(counters.a.get(), 1);
        assert_eq!(counters.b.get(), 1);
    }

    #[test]
    fn test_set_period_rebases_deadline() {
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();
        let id = sched.register(bump_a, 1000).expect("slot free");

        sched.set_period(id, 200).expect("registered");
        sched.step(200, &counters).expect("steps");
        assert_eq!(counters.a.get(), 1);
    }

    #[test]
    fn test_two_jobs_independent_cadence() {
        let counters = Counters::default();
        let mut sched: Scheduler<Counters> = Scheduler::new();
        sched.register(bump_a, 100).expect("slot free");
        sched.register(bump_b, 300).expect("slot free");

        for _ in 0..6 {
            sched.step(100, &counters).expect("steps");
        }
        assert_eq!(counters.a.get(), 6);
        assert_eq!(counters.b.get(), 2);
    }

    proptest! {
        #[test]
        fn prop_exact_fire_count(
            period in 1u32..1000,
            steps in 1usize..200,
        ) {
            let counters = Counters::default();
            let mut sched: Scheduler<Counters> = Scheduler::new();
            sched.register(bump_a, period).expect("slot free");
            for _ in 0..steps {
                sched.step(period, &counters).expect("steps");
            }
            prop_assert_eq!(counters.a.get(), steps as u32);
        }
    }
}
