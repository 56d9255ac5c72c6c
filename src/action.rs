//! Named, timed callbacks fired around the exchange (`spec.md` §4.1, §6, §9).
//!
//! The design note in `spec.md` §9 observes that a five-valued timing enum
//! combined with set-membership checks is naturally a bitset; `ActionTiming`
//! is that bitset, and `SessionFacade::advance` calls `trigger(mask)` in
//! place of constructing a `set<Timing>` at each of its call sites.

bitflags::bitflags! {
    /// When, relative to one call to `advance`, an [`Action`] should run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActionTiming: u8 {
        /// Every call to `advance`, regardless of exchange or convergence.
        const ALWAYS_PRIOR = 0b0000_0001;
        const ALWAYS_POST = 0b0000_0010;
        /// Only on calls where an inter-participant exchange is about to
        /// happen / just happened.
        const ON_EXCHANGE_PRIOR = 0b0000_0100;
        const ON_EXCHANGE_POST = 0b0000_1000;
        /// Only once the current time window has fully converged/elapsed.
        const ON_TIMESTEP_COMPLETE_POST = 0b0001_0000;
    }
}

/// Two action names the core itself recognizes; everything else is an
/// opaque, user-defined tag that `SessionFacade` never interprets.
pub const WRITE_ITERATION_CHECKPOINT: &str = "write-iteration-checkpoint";
pub const READ_ITERATION_CHECKPOINT: &str = "read-iteration-checkpoint";
pub const PLOT_OUTPUT: &str = "plot-output";

/// A data action: a user-supplied callback identified by `name`, invoked
/// whenever the current call's fired-timing mask intersects `timing`.
///
/// The core does not call actions directly (the embedding solver polls
/// `SessionFacade::is_action_required`/`fulfilled_action`); this struct just
/// tracks whether an action's required timing has come up during the
/// current call to `advance`.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub timing: ActionTiming,
    required: bool,
}

impl Action {
    pub fn new(name: impl Into<String>, timing: ActionTiming) -> Self {
        Self { name: name.into(), timing, required: false }
    }

    /// Marks this action as required if `fired` intersects its timing.
    pub fn trigger(&mut self, fired: ActionTiming) {
        if self.timing.intersects(fired) {
            self.required = true;
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn fulfill(&mut self) {
        self.required = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_becomes_required_only_on_matching_timing() {
        let mut action = Action::new("write-iteration-checkpoint", ActionTiming::ON_EXCHANGE_PRIOR);
        action.trigger(ActionTiming::ALWAYS_PRIOR);
        assert!(!action.is_required());
        action.trigger(ActionTiming::ON_EXCHANGE_PRIOR);
        assert!(action.is_required());
        action.fulfill();
        assert!(!action.is_required());
    }
}
