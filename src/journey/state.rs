//! The journey state machine, free of any browser.
//!
//! [`AttemptState`] owns everything one attempt knows: where the journey is,
//! which address candidates are queued and which were already used. The
//! driver loop performs side effects and reports what it saw as an
//! [`Observation`]; the state machine decides where that leads.

use crate::address::AddressCandidate;
use crate::blocker::{BlockerKind, BlockerScope};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// A journey step that waits for a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Postcode,
    Address,
    Service,
    Proceed,
    Tariff,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Postcode => "postcode",
            Step::Address => "address",
            Step::Service => "service",
            Step::Proceed => "proceed",
            Step::Tariff => "tariff",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Blocker(BlockerKind),
    /// The step's milestone never showed.
    Timeout(Step),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyState {
    Init,
    PostcodeEntered,
    AddressSelected,
    ServiceConfigured,
    ContinuedToListing,
    TariffSelected,
    DetailsExtracted,
    Blocked(BlockReason),
    /// No address candidates left.
    Exhausted,
}

impl JourneyState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JourneyState::DetailsExtracted | JourneyState::Blocked(_) | JourneyState::Exhausted
        )
    }

    /// Where a milestone leads.
    fn successor(self) -> JourneyState {
        match self {
            JourneyState::Init => JourneyState::PostcodeEntered,
            JourneyState::AddressSelected => JourneyState::ServiceConfigured,
            JourneyState::ServiceConfigured => JourneyState::ContinuedToListing,
            JourneyState::ContinuedToListing => JourneyState::TariffSelected,
            JourneyState::TariffSelected => JourneyState::DetailsExtracted,
            other => other,
        }
    }
}

/// What the driver saw after performing a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Milestone,
    Blocker(BlockerKind),
    /// The page offered no way forward for this address.
    AddressIneligible,
    Timeout(Step),
}

/// State of a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptState {
    state: JourneyState,
    attempt: u32,
    max_candidates: usize,
    queue: VecDeque<AddressCandidate>,
    current: Option<AddressCandidate>,
    tried: BTreeSet<usize>,
    loaded: bool,
    awaiting_confirmation: bool,
}

impl AttemptState {
    pub fn new(attempt: u32, max_candidates: usize) -> Self {
        Self {
            state: JourneyState::Init,
            attempt,
            max_candidates,
            queue: VecDeque::new(),
            current: None,
            tried: BTreeSet::new(),
            loaded: false,
            awaiting_confirmation: false,
        }
    }

    pub fn state(&self) -> JourneyState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn tried(&self) -> &BTreeSet<usize> {
        &self.tried
    }

    /// Number of addresses used so far.
    pub fn address_attempts(&self) -> usize {
        self.tried.len()
    }

    pub fn current(&self) -> Option<&AddressCandidate> {
        self.current.as_ref()
    }

    /// The address list has not been read yet this attempt.
    pub fn needs_candidates(&self) -> bool {
        !self.loaded
    }

    /// The current address was picked but the page has not accepted it yet.
    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    /// Queue candidates, capped at the per-attempt limit.
    pub fn load_candidates(&mut self, candidates: Vec<AddressCandidate>) {
        self.queue = candidates
            .into_iter()
            .filter(|c| !self.tried.contains(&c.index))
            .take(self.max_candidates.saturating_sub(self.tried.len()))
            .collect();
        self.loaded = true;
    }

    /// Move to the next queued candidate, or to `Exhausted`.
    pub fn advance_address(&mut self) -> JourneyState {
        if self.state.is_terminal() {
            return self.state;
        }
        match self.queue.pop_front() {
            Some(mut candidate) => {
                candidate.tried = true;
                self.tried.insert(candidate.index);
                self.current = Some(candidate);
                self.awaiting_confirmation = true;
                self.state = JourneyState::AddressSelected;
            }
            None => {
                self.current = None;
                self.awaiting_confirmation = false;
                self.state = JourneyState::Exhausted;
            }
        }
        self.state
    }

    /// Apply what the driver observed.
    pub fn observe(&mut self, observation: Observation) -> JourneyState {
        if self.state.is_terminal() {
            return self.state;
        }
        match observation {
            Observation::Milestone => {
                if self.state == JourneyState::AddressSelected && self.awaiting_confirmation {
                    self.awaiting_confirmation = false;
                } else {
                    self.state = self.state.successor();
                }
            }
            Observation::Blocker(kind) if kind.scope() == BlockerScope::Address => {
                self.reject_address(BlockReason::Blocker(kind));
            }
            Observation::AddressIneligible => {
                self.reject_address(BlockReason::Timeout(Step::Address));
            }
            Observation::Blocker(kind) => {
                self.state = JourneyState::Blocked(BlockReason::Blocker(kind));
            }
            Observation::Timeout(step) => {
                self.state = JourneyState::Blocked(BlockReason::Timeout(step));
            }
        }
        self.state
    }

    // Without a selected address there is nothing to skip, so the attempt
    // is blocked instead.
    fn reject_address(&mut self, fallback: BlockReason) {
        if self.current.is_some() {
            self.advance_address();
        } else {
            self.state = JourneyState::Blocked(fallback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cands(indices: &[usize]) -> Vec<AddressCandidate> {
        indices
            .iter()
            .map(|&index| AddressCandidate {
                index,
                raw_text: format!("{} Main St", index),
                is_residential: true,
                tried: false,
            })
            .collect()
    }

    fn at_address_list(max: usize, indices: &[usize]) -> AttemptState {
        let mut s = AttemptState::new(1, max);
        assert_eq!(s.observe(Observation::Milestone), JourneyState::PostcodeEntered);
        assert!(s.needs_candidates());
        s.load_candidates(cands(indices));
        s
    }

    #[test]
    fn test_happy_path() {
        let mut s = at_address_list(6, &[2, 3]);
        assert_eq!(s.advance_address(), JourneyState::AddressSelected);
        assert!(s.awaiting_confirmation());

        assert_eq!(s.observe(Observation::Milestone), JourneyState::AddressSelected);
        assert!(!s.awaiting_confirmation());
        assert_eq!(s.observe(Observation::Milestone), JourneyState::ServiceConfigured);
        assert_eq!(s.observe(Observation::Milestone), JourneyState::ContinuedToListing);
        assert_eq!(s.observe(Observation::Milestone), JourneyState::TariffSelected);
        assert_eq!(s.observe(Observation::Milestone), JourneyState::DetailsExtracted);
        assert!(s.state().is_terminal());
        assert_eq!(s.address_attempts(), 1);
        assert_eq!(s.current().map(|c| c.index), Some(2));
    }

    #[test]
    fn test_address_blocker_moves_to_next_candidate() {
        let mut s = at_address_list(6, &[2, 3]);
        s.advance_address();
        s.observe(Observation::Milestone);
        s.observe(Observation::Milestone);

        let next = s.observe(Observation::Blocker(BlockerKind::PrepaymentMeter));
        assert_eq!(next, JourneyState::AddressSelected);
        assert!(s.awaiting_confirmation());
        assert_eq!(s.current().map(|c| c.index), Some(3));
        assert!(s.current().is_some_and(|c| c.tried));

        let last = s.observe(Observation::AddressIneligible);
        assert_eq!(last, JourneyState::Exhausted);
        assert_eq!(s.tried().iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_session_blocker_and_timeout_abort() {
        let mut s = at_address_list(6, &[2, 3]);
        s.advance_address();
        assert_eq!(
            s.observe(Observation::Blocker(BlockerKind::RateLimited)),
            JourneyState::Blocked(BlockReason::Blocker(BlockerKind::RateLimited))
        );
        // terminal states absorb everything
        assert_eq!(
            s.observe(Observation::Milestone),
            JourneyState::Blocked(BlockReason::Blocker(BlockerKind::RateLimited))
        );

        let mut t = AttemptState::new(2, 6);
        assert_eq!(
            t.observe(Observation::Timeout(Step::Postcode)),
            JourneyState::Blocked(BlockReason::Timeout(Step::Postcode))
        );
        assert_eq!(t.attempt(), 2);
    }

    #[test]
    fn test_address_blocker_before_selection_blocks() {
        let mut s = AttemptState::new(1, 6);
        assert_eq!(
            s.observe(Observation::Blocker(BlockerKind::AlreadyCustomer)),
            JourneyState::Blocked(BlockReason::Blocker(BlockerKind::AlreadyCustomer))
        );
    }

    #[test]
    fn test_candidate_cap() {
        let mut s = at_address_list(2, &[1, 2, 3, 4]);
        assert_eq!(s.advance_address(), JourneyState::AddressSelected);
        assert_eq!(s.advance_address(), JourneyState::AddressSelected);
        assert_eq!(s.advance_address(), JourneyState::Exhausted);
        assert_eq!(s.address_attempts(), 2);
    }

    #[test]
    fn test_empty_list_is_exhausted() {
        let mut s = at_address_list(6, &[]);
        assert_eq!(s.advance_address(), JourneyState::Exhausted);
        assert_eq!(s.address_attempts(), 0);
    }
}
