//! The bind-protocol state machine: supplicant/respondent Offer/Accept/
//! Confirm phases, ported transition-for-transition from the original's
//! `tests_rf/test_rf_bindings_fsm.py`.

use std::sync::Arc;

use crate::address::DeviceId;
use crate::clock::Clock;
use crate::error::Error;

/// Default `CONFIRM_TIMEOUT_SECS`; callers needing deterministic tests
/// can override it when constructing a `Context`.
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 3;
/// Default `WAITING_TIMEOUT_SECS`.
pub const DEFAULT_WAITING_TIMEOUT_SECS: u64 = 300;

/// A bind context's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Listening,
    Accepting,
    Accepted,
    BoundAccepted,
    Offering,
    Offered,
    Confirming,
    Confirmed,
    Bound,
    /// Entered after a flow violation; `_prev_state` records where from.
    Unknown,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Listening => "LISTENING",
            State::Accepting => "ACCEPTING",
            State::Accepted => "ACCEPTED",
            State::BoundAccepted => "BOUND_ACCEPTED",
            State::Offering => "OFFERING",
            State::Offered => "OFFERED",
            State::Confirming => "CONFIRMING",
            State::Confirmed => "CONFIRMED",
            State::Bound => "BOUND",
            State::Unknown => "UNKNOWN",
        }
    }

    /// Whether a `Context` in this state may safely be replaced by a fresh
    /// one for the same device. `BOUND` and `UNKNOWN` are end-of-flow; every
    /// other state is a handshake still in progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Bound | State::Unknown)
    }
}

/// Which role a [`Context`] plays in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Supplicant,
    Respondent,
}

/// A bind-protocol context, owned by one side of the handshake.
#[derive(Debug, Clone)]
pub struct Context {
    role: Role,
    state: State,
    prev_state: Option<State>,
    offers_sent: u32,
    confirms_sent: u32,
    device: DeviceId,
    clock: Arc<dyn Clock>,
    confirm_timeout_secs: u64,
    waiting_timeout_secs: u64,
}

const MAX_OFFERS: u32 = 3;
const MAX_CONFIRMS: u32 = 3;

impl Context {
    fn new(role: Role, device: DeviceId, state: State, clock: Arc<dyn Clock>, confirm_timeout_secs: u64, waiting_timeout_secs: u64) -> Context {
        Context {
            role,
            state,
            prev_state: None,
            offers_sent: 0,
            confirms_sent: 0,
            device,
            clock,
            confirm_timeout_secs,
            waiting_timeout_secs,
        }
    }

    /// Starts a supplicant context in `OFFERING`.
    pub fn supplicant(device: DeviceId, clock: Arc<dyn Clock>, confirm_timeout_secs: u64, waiting_timeout_secs: u64) -> Context {
        Context::new(Role::Supplicant, device, State::Offering, clock, confirm_timeout_secs, waiting_timeout_secs)
    }

    /// Starts a respondent context in `LISTENING`.
    pub fn respondent(device: DeviceId, clock: Arc<dyn Clock>, confirm_timeout_secs: u64, waiting_timeout_secs: u64) -> Context {
        Context::new(Role::Respondent, device, State::Listening, clock, confirm_timeout_secs, waiting_timeout_secs)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn prev_state(&self) -> Option<State> {
        self.prev_state
    }

    fn flow_error(&mut self, action: &'static str) -> Error {
        self.prev_state = Some(self.state);
        self.state = State::Unknown;
        Error::BindFlowError {
            state: self.prev_state.unwrap().name(),
            action,
        }
    }

    fn require_not_unknown(&self, action: &str) -> Result<(), Error> {
        if self.state == State::Unknown {
            return Err(Error::BindStateError {
                reason: format!("cannot {action}: context is in UNKNOWN (was {:?})", self.prev_state),
            });
        }
        Ok(())
    }

    /// Records that this (supplicant) context sent an Offer. May be called
    /// repeatedly (the supplicant resending its Offer while unacknowledged)
    /// up to `MAX_OFFERS` times.
    pub fn sent_offer(&mut self) -> Result<(), Error> {
        self.require_not_unknown("send offer")?;
        let resend_ok = matches!(self.state, State::Offering | State::Offered) && self.offers_sent < MAX_OFFERS;
        if self.role != Role::Supplicant || !resend_ok {
            return Err(self.flow_error("sent_offer"));
        }
        self.offers_sent += 1;
        self.state = State::Offered;
        Ok(())
    }

    /// Records that this context received an Offer from `src`.
    pub fn rcvd_offer(&mut self, src: DeviceId) -> Result<(), Error> {
        self.require_not_unknown("receive offer")?;
        match (self.role, self.state) {
            (Role::Supplicant, State::Offered) if src == self.device => Ok(()),
            (Role::Respondent, State::Listening) => {
                self.state = State::Accepting;
                Ok(())
            }
            _ => Err(self.flow_error("rcvd_offer")),
        }
    }

    /// Records that this (respondent) context sent an Accept.
    pub fn sent_accept(&mut self) -> Result<(), Error> {
        self.require_not_unknown("send accept")?;
        if self.role != Role::Respondent || self.state != State::Accepting {
            return Err(self.flow_error("sent_accept"));
        }
        self.state = State::Accepted;
        Ok(())
    }

    /// Records that this context received an Accept from `src`.
    pub fn rcvd_accept(&mut self, src: DeviceId) -> Result<(), Error> {
        self.require_not_unknown("receive accept")?;
        match (self.role, self.state) {
            (Role::Respondent, State::Accepted) if src == self.device => Ok(()),
            (Role::Supplicant, State::Offered) => {
                self.state = State::Confirming;
                Ok(())
            }
            _ => Err(self.flow_error("rcvd_accept")),
        }
    }

    /// Records that this (supplicant) context sent a Confirm.
    pub fn sent_confirm(&mut self) -> Result<(), Error> {
        self.require_not_unknown("send confirm")?;
        let confirming_ok = self.state == State::Confirming && self.confirms_sent == 0;
        let repeat_ok = (self.state == State::Confirmed || self.state == State::Bound) && self.confirms_sent < MAX_CONFIRMS;
        if self.role != Role::Supplicant || !(confirming_ok || repeat_ok) {
            return Err(self.flow_error("sent_confirm"));
        }
        self.confirms_sent += 1;
        if self.state == State::Confirming {
            self.state = State::Confirmed;
        }
        if self.confirms_sent >= MAX_CONFIRMS {
            self.state = State::Bound;
        }
        Ok(())
    }

    /// Records that this context received a Confirm from `src`.
    pub fn rcvd_confirm(&mut self, src: DeviceId) -> Result<(), Error> {
        self.require_not_unknown("receive confirm")?;
        match (self.role, self.state) {
            (Role::Supplicant, State::Confirmed | State::Bound) if src == self.device => Ok(()),
            (Role::Respondent, State::Accepted) => {
                self.state = State::BoundAccepted;
                Ok(())
            }
            (Role::Respondent, State::BoundAccepted | State::Bound) => Ok(()),
            _ => Err(self.flow_error("rcvd_confirm")),
        }
    }

    /// Advances the `BOUND_ACCEPTED → BOUND` timeout edge if due, and the
    /// `LISTENING → UNKNOWN` waiting-timeout edge if due. Call periodically
    /// from the transport's suspension points.
    pub fn poll_timeout(&mut self, since_transition: std::time::Duration) {
        match self.state {
            State::BoundAccepted if since_transition.as_secs() >= self.confirm_timeout_secs => {
                self.state = State::Bound;
            }
            State::Listening if since_transition.as_secs() >= self.waiting_timeout_secs => {
                self.prev_state = Some(self.state);
                self.state = State::Unknown;
            }
            _ => {}
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_util::FixedClock;
    use std::time::Duration;

    fn clocks() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(chrono::Utc::now()))
    }

    fn ids() -> (DeviceId, DeviceId) {
        ("04:111111".parse().unwrap(), "01:222222".parse().unwrap())
    }

    #[test]
    fn full_bind_sequence_reaches_bound() {
        let (supplicant_id, respondent_id) = ids();
        let mut supplicant = Context::supplicant(supplicant_id, clocks(), 3, 300);
        let mut respondent = Context::respondent(respondent_id, clocks(), 3, 300);

        supplicant.sent_offer().unwrap();
        supplicant.rcvd_offer(supplicant_id).unwrap();
        respondent.rcvd_offer(supplicant_id).unwrap();
        assert_eq!(respondent.state(), State::Accepting);

        respondent.sent_accept().unwrap();
        respondent.rcvd_accept(respondent_id).unwrap();
        supplicant.rcvd_accept(respondent_id).unwrap();
        assert_eq!(supplicant.state(), State::Confirming);

        supplicant.sent_confirm().unwrap();
        supplicant.rcvd_confirm(supplicant_id).unwrap();
        respondent.rcvd_confirm(supplicant_id).unwrap();
        assert_eq!(respondent.state(), State::BoundAccepted);

        respondent.poll_timeout(Duration::from_secs(3));
        assert_eq!(respondent.state(), State::Bound);

        supplicant.sent_confirm().unwrap();
        supplicant.sent_confirm().unwrap();
        assert_eq!(supplicant.state(), State::Bound);
    }

    #[test]
    fn sending_before_offer_is_flow_error() {
        let (supplicant_id, _respondent_id) = ids();
        let mut supplicant = Context::supplicant(supplicant_id, clocks(), 3, 300);
        let err = supplicant.sent_confirm().unwrap_err();
        assert!(matches!(err, Error::BindFlowError { .. }));
    }

    #[test]
    fn fourth_offer_is_flow_error_then_state_error() {
        let (supplicant_id, _respondent_id) = ids();
        let mut supplicant = Context::supplicant(supplicant_id, clocks(), 3, 300);
        supplicant.sent_offer().unwrap();
        supplicant.sent_offer().unwrap();
        supplicant.sent_offer().unwrap();
        let err = supplicant.sent_offer().unwrap_err();
        assert!(matches!(err, Error::BindFlowError { .. }));
        assert_eq!(supplicant.state(), State::Unknown);
        assert_eq!(supplicant.prev_state(), Some(State::Offered));

        let err2 = supplicant.sent_offer().unwrap_err();
        assert!(matches!(err2, Error::BindStateError { .. }));
    }

    #[test]
    fn respondent_waiting_timeout_moves_to_unknown() {
        let (_supplicant_id, respondent_id) = ids();
        let mut respondent = Context::respondent(respondent_id, clocks(), 3, 0);
        respondent.poll_timeout(Duration::from_secs(0));
        assert_eq!(respondent.state(), State::Unknown);
        assert_eq!(respondent.prev_state(), Some(State::Listening));
    }
}
