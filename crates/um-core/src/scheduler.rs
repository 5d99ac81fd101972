//! Mutation-driven re-evaluation
//!
//! Pages keep changing after load. Every batch of structural mutations that
//! adds at least one node the engine did not create re-arms a debounce
//! deadline; once the page has been quiet for the whole window, one pass is
//! due. Nodes the engine inserts are tagged with [`Origin::Engine`] and never
//! trigger a pass themselves.
//!
//! The scheduler is a plain state machine over caller-supplied timestamps,
//! so hosts drive it from whatever clock they have.

use std::time::Duration;

/// Who inserted a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Engine,
    External,
}

/// Directly added nodes of one observed mutation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub added: Vec<Origin>,
}

impl MutationBatch {
    pub fn new(added: Vec<Origin>) -> Self {
        Self { added }
    }

    /// Whether any added node came from outside the engine.
    pub fn is_external(&self) -> bool {
        self.added.iter().any(|origin| *origin == Origin::External)
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    debounce: Duration,
    deadline: Option<Duration>,
    in_flight: bool,
    passes: u64,
}

impl Scheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
            in_flight: false,
            passes: 0,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a mutation batch observed at `now`.
    ///
    /// Returns true if the batch re-armed the deadline.
    pub fn observe(&mut self, batch: &MutationBatch, now: Duration) -> bool {
        if !batch.is_external() {
            return false;
        }
        self.deadline = Some(now + self.debounce);
        log::trace!("mutation observed, pass due at {:?}", self.deadline);
        true
    }

    /// Deadline of the armed pass, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Whether a pass should start at `now`.
    ///
    /// Fires once per armed deadline. A pass already in flight holds the
    /// deadline until it ends.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline && !self.in_flight => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn begin_pass(&mut self) {
        self.in_flight = true;
    }

    pub fn end_pass(&mut self) {
        self.in_flight = false;
        self.passes += 1;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Number of passes completed since creation.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn external() -> MutationBatch {
        MutationBatch::new(vec![Origin::External])
    }

    #[test]
    fn test_burst_yields_one_pass() {
        let mut scheduler = Scheduler::new(ms(500));
        assert!(scheduler.observe(&external(), ms(0)));
        assert!(scheduler.observe(&external(), ms(100)));
        assert!(scheduler.observe(&external(), ms(200)));

        assert!(!scheduler.poll(ms(600)));
        assert!(scheduler.poll(ms(700)));
        assert!(!scheduler.poll(ms(800)));
    }

    #[test]
    fn test_engine_mutations_are_ignored() {
        let mut scheduler = Scheduler::new(ms(500));
        assert!(!scheduler.observe(&MutationBatch::new(vec![Origin::Engine, Origin::Engine]), ms(0)));
        assert!(!scheduler.observe(&MutationBatch::default(), ms(0)));
        assert_eq!(scheduler.deadline(), None);
        assert!(!scheduler.poll(ms(10_000)));

        assert!(scheduler.observe(&MutationBatch::new(vec![Origin::Engine, Origin::External]), ms(0)));
        assert!(scheduler.poll(ms(500)));
    }

    #[test]
    fn test_in_flight_pass_holds_deadline() {
        let mut scheduler = Scheduler::new(ms(100));
        scheduler.observe(&external(), ms(0));
        assert!(scheduler.poll(ms(100)));
        scheduler.begin_pass();

        scheduler.observe(&external(), ms(150));
        assert!(!scheduler.poll(ms(300)));
        assert!(scheduler.is_in_flight());

        scheduler.end_pass();
        assert!(scheduler.poll(ms(300)));
        assert_eq!(scheduler.passes(), 1);
    }
}
