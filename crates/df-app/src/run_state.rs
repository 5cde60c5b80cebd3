//! Run state machine.
//!
//! `Idle -> Compiling -> Evaluating -> Committing | RollingBack -> Idle`.
//! At most one run is in flight; requests arriving meanwhile collapse into a
//! single trailing run.

/// Phase of the run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Compiling,
    Evaluating,
    Committing,
    RollingBack,
}

/// What asked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    /// An explicit request.
    Manual,
    /// An edit or document change with dynamic run enabled.
    Automatic,
}

#[derive(Debug)]
pub struct RunGate {
    phase: RunPhase,
    queued: Option<RunTrigger>,
    started: usize,
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RunGate {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            queued: None,
            started: 0,
        }
    }

    /// Ask for a run. Returns true when the caller must start it; false when
    /// a run is already in flight and this request was queued behind it.
    pub fn request(&mut self, trigger: RunTrigger) -> bool {
        if self.phase == RunPhase::Idle {
            self.phase = RunPhase::Compiling;
            self.started += 1;
            true
        } else {
            // A manual request outranks an automatic one.
            self.queued = match (self.queued, trigger) {
                (Some(RunTrigger::Manual), _) => Some(RunTrigger::Manual),
                _ => Some(trigger),
            };
            false
        }
    }

    pub fn enter(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    /// The run in flight is done. Returns the trigger of the queued run the
    /// caller must start next, if any; otherwise the gate goes Idle.
    pub fn finish(&mut self) -> Option<RunTrigger> {
        match self.queued.take() {
            Some(trigger) => {
                self.phase = RunPhase::Compiling;
                self.started += 1;
                Some(trigger)
            }
            None => {
                self.phase = RunPhase::Idle;
                None
            }
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != RunPhase::Idle
    }

    pub fn run_again(&self) -> bool {
        self.queued.is_some()
    }

    /// Runs started since creation.
    pub fn runs_started(&self) -> usize {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn burst_collapses_to_one_trailing_run() {
        let mut gate = RunGate::new();
        assert!(gate.request(RunTrigger::Manual));
        gate.enter(RunPhase::Evaluating);

        for _ in 0..5 {
            assert!(!gate.request(RunTrigger::Automatic));
        }
        assert!(gate.run_again());

        assert_eq!(gate.finish(), Some(RunTrigger::Automatic));
        assert!(gate.is_running());
        assert!(!gate.run_again());

        assert_eq!(gate.finish(), None);
        assert_eq!(gate.phase(), RunPhase::Idle);
        assert_eq!(gate.runs_started(), 2);
    }

    #[test]
    fn queued_manual_request_is_kept() {
        let mut gate = RunGate::new();
        gate.request(RunTrigger::Automatic);
        gate.request(RunTrigger::Manual);
        gate.request(RunTrigger::Automatic);
        assert_eq!(gate.finish(), Some(RunTrigger::Manual));
    }

    #[test]
    fn idle_gate_starts_immediately() {
        let mut gate = RunGate::new();
        assert!(!gate.is_running());
        assert!(gate.request(RunTrigger::Automatic));
        assert_eq!(gate.phase(), RunPhase::Compiling);
        assert_eq!(gate.finish(), None);
        assert!(gate.request(RunTrigger::Manual));
    }

    fn trigger() -> impl Strategy<Value = RunTrigger> {
        prop_oneof![Just(RunTrigger::Manual), Just(RunTrigger::Automatic)]
    }

    proptest! {
        // Each burst during a run costs at most one trailing run.
        #[test]
        fn bursts_never_stack(bursts in prop::collection::vec(prop::collection::vec(trigger(), 0..6), 1..8)) {
            let mut gate = RunGate::new();
            let mut in_flight = false;
            for burst in &bursts {
                let before = gate.runs_started();
                for &t in burst {
                    let started = gate.request(t);
                    prop_assert_eq!(started, !in_flight);
                    in_flight = true;
                }
                prop_assert!(gate.runs_started() - before <= 1);

                let mut trailing = 0;
                while gate.finish().is_some() {
                    trailing += 1;
                }
                prop_assert!(trailing <= 1);
                prop_assert_eq!(gate.phase(), RunPhase::Idle);
                in_flight = false;
            }
        }
    }
}
