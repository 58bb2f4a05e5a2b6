use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::{
    booking::{self, BookingResult, ResourceChoice},
    config::BookingTarget,
    portal::Portal,
    session::Session,
};

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    Primary,
    Alternate,
}

/// Two-state machine: the transaction runs against the primary resource, and
/// on failure transitions at most once to the alternate. There is no further
/// fallback beyond the alternate. The alternate retry re-runs the full
/// transaction, since alternate facilities carry their own tjk/slot-type ids
/// and therefore a fresh price computation.
#[derive(Debug)]
pub struct FailoverController {
    state: FailoverState,
}

impl FailoverController {
    pub fn new() -> Self {
        FailoverController {
            state: FailoverState::Primary,
        }
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub async fn execute(
        &mut self,
        portal: &dyn Portal,
        session: &Session,
        target: &BookingTarget,
    ) -> BookingResult {
        let primary =
            booking::book_and_confirm(portal, session, target, &target.primary, ResourceChoice::Primary)
                .await;
        if primary.success {
            return primary;
        }
        let Some(alternate) = &target.alternate else {
            info!("no alternate facility configured, attempt failed");
            return primary;
        };
        warn!(
            "primary booking failed, failing over to {} (tjk {})",
            alternate.label, alternate.tjk_id
        );
        self.state = FailoverState::Alternate;
        sleep(RETRY_DELAY).await;
        booking::book_and_confirm(portal, session, target, alternate, ResourceChoice::Alternate)
            .await
    }
}

impl Default for FailoverController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        BOOKED_PAGE, BOOKED_URL, FakePortal, REJECTED_URL, test_session_with_token, test_target,
    };

    #[tokio::test(start_paused = true)]
    async fn primary_success_never_touches_the_alternate() {
        let portal = FakePortal::new();
        portal.bookings.push_page(200, BOOKED_URL, BOOKED_PAGE);
        portal
            .confirms
            .set_fallback_page(200, "https://portal/?msg=verified", "");

        let mut controller = FailoverController::new();
        let result = controller
            .execute(&portal, &test_session_with_token(), &test_target(true))
            .await;
        assert!(result.success);
        assert_eq!(result.resource, ResourceChoice::Primary);
        assert_eq!(controller.state(), FailoverState::Primary);
        assert_eq!(portal.bookings.hits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_failure_fails_over_exactly_once() {
        let portal = FakePortal::new();
        portal.bookings.push_page(200, REJECTED_URL, "Ralat");
        portal.bookings.push_page(200, BOOKED_URL, BOOKED_PAGE);
        portal
            .confirms
            .set_fallback_page(200, "https://portal/?msg=verified", "");

        let mut controller = FailoverController::new();
        let result = controller
            .execute(&portal, &test_session_with_token(), &test_target(true))
            .await;
        assert!(result.success);
        assert_eq!(result.resource, ResourceChoice::Alternate);
        assert_eq!(result.court.as_deref(), Some("Gelanggang Tenis 2"));
        assert_eq!(controller.state(), FailoverState::Alternate);
        assert_eq!(portal.bookings.hits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn both_resources_failing_is_terminal() {
        let portal = FakePortal::new();
        portal.bookings.set_fallback_page(200, REJECTED_URL, "Ralat");

        let mut controller = FailoverController::new();
        let result = controller
            .execute(&portal, &test_session_with_token(), &test_target(true))
            .await;
        assert!(!result.success);
        assert_eq!(result.resource, ResourceChoice::Alternate);
        // Exactly two transaction calls, never a third.
        assert_eq!(portal.bookings.hits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_alternate_means_a_single_transaction() {
        let portal = FakePortal::new();
        portal.bookings.set_fallback_page(200, REJECTED_URL, "Ralat");

        let mut controller = FailoverController::new();
        let result = controller
            .execute(&portal, &test_session_with_token(), &test_target(false))
            .await;
        assert!(!result.success);
        assert_eq!(result.resource, ResourceChoice::Primary);
        assert_eq!(controller.state(), FailoverState::Primary);
        assert_eq!(portal.bookings.hits(), 1);
    }
}
