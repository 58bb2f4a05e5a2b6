use std::time::Duration;

use chrono::NaiveDate;
use log::{error, info, warn};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BookingTarget, Facility, TimeWindow},
    failover::FailoverController,
    markup,
    poll::{PollOutcome, PollSettings, poll},
    portal::Portal,
    session::Session,
    token::{self, CalendarPath},
};

const VENUE_POLL_INTERVAL: Duration = Duration::from_secs(3);
const VENUE_POLL_CAP: Duration = Duration::from_secs(3000);

/// The one user-visible terminal state of a day's attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Booked,
    BookedUnconfirmed,
    TimedOut,
    Rejected,
    AuthFailed,
}

impl AttemptOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, AttemptOutcome::Booked | AttemptOutcome::BookedUnconfirmed)
    }

    pub fn label(self) -> &'static str {
        match self {
            AttemptOutcome::Booked => "Booked",
            AttemptOutcome::BookedUnconfirmed => "Booked (unconfirmed)",
            AttemptOutcome::TimedOut => "Timed out",
            AttemptOutcome::Rejected => "Rejected",
            AttemptOutcome::AuthFailed => "Auth failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayResult {
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub outcome: AttemptOutcome,
    pub court: Option<String>,
    pub booking_ref: Option<String>,
}

impl DayResult {
    fn terminal(target: &BookingTarget, outcome: AttemptOutcome) -> Self {
        DayResult {
            date: target.date,
            window: target.window,
            outcome,
            court: None,
            booking_ref: None,
        }
    }

    pub fn day_name(&self) -> String {
        self.date.format("%A").to_string()
    }
}

/// Ordered per-weekday results of one weekly run, built incrementally.
#[derive(Debug, Default)]
pub struct WeeklyReport {
    pub days: Vec<DayResult>,
}

impl WeeklyReport {
    pub fn booked_count(&self) -> usize {
        self.days.iter().filter(|d| d.outcome.is_success()).count()
    }

    pub fn any_success(&self) -> bool {
        self.booked_count() > 0
    }

    /// Telegram-ready summary, one block per requested weekday.
    pub fn summary_text(&self) -> String {
        let mut lines = vec![
            "\u{1f4c5} <b>WEEKLY BOOKING SUMMARY</b>".to_string(),
            "Location: Kompleks Sukan KBS".to_string(),
            format!("Total: {}/{} booked", self.booked_count(), self.days.len()),
            String::new(),
        ];
        for day in &self.days {
            let mark = if day.outcome.is_success() { "\u{2705}" } else { "\u{274c}" };
            let court = day
                .court
                .as_ref()
                .map(|court| format!(" - {court}"))
                .unwrap_or_default();
            lines.push(format!(
                "{mark} {} ({}){court}",
                day.day_name(),
                day.date.format("%d/%m/%Y")
            ));
            lines.push(format!(
                "    Time: {}-{} ({}h) [{}]",
                day.window.start_field(),
                day.window.end_field(),
                day.window.hours(),
                day.outcome.label(),
            ));
        }
        lines.join("\n")
    }
}

/// Sequences one or many day-attempts over a single authenticated session:
/// facilities -> token -> poll -> book (with failover). A day's failure never
/// aborts the remaining days; the orchestrator always hands back result
/// values, never faults.
pub struct Orchestrator<'a> {
    portal: &'a dyn Portal,
    poll_settings: PollSettings,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(portal: &'a dyn Portal, poll_settings: PollSettings) -> Self {
        Orchestrator {
            portal,
            poll_settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for the run-level cancel signal (e.g. wired to ctrl-c).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run_day(&self, session: &mut Session, target: &BookingTarget) -> DayResult {
        info!(
            "=== booking attempt: {} {} {}-{} ===",
            target.day_name(),
            target.date_field(),
            target.window.start_field(),
            target.window.end_field(),
        );

        let Some(facilities) = self.resolve_facilities(target).await else {
            return DayResult::terminal(target, AttemptOutcome::Rejected);
        };
        let facility_encoded = match facilities.get(target.facility_index) {
            Some(facility) => facility.facility_encoded.clone(),
            None => {
                warn!(
                    "facility index {} out of range ({} listed), using the first",
                    target.facility_index,
                    facilities.len()
                );
                facilities[0].facility_encoded.clone()
            }
        };
        let path = CalendarPath {
            venue: target.venue_encoded.clone(),
            facility: facility_encoded,
            region: target.region.clone(),
        };

        // A token held over from an earlier day is reused; it only gets
        // re-resolved once it crosses the staleness window.
        if session.token().is_none() {
            if let Err(e) = token::resolve(self.portal, session, &path).await {
                error!("token resolution failed: {e}");
                return DayResult::terminal(target, AttemptOutcome::Rejected);
            }
        } else {
            token::refresh_if_stale(self.portal, session, &path).await;
        }

        match poll(
            self.portal,
            session,
            target,
            &path,
            &self.poll_settings,
            &self.cancel,
        )
        .await
        {
            PollOutcome::Available => {}
            PollOutcome::TimedOut => {
                return DayResult::terminal(target, AttemptOutcome::TimedOut);
            }
            PollOutcome::Cancelled => {
                warn!("attempt cancelled mid-poll");
                return DayResult::terminal(target, AttemptOutcome::TimedOut);
            }
        }

        // The slot may have opened hours into the poll; make sure the token
        // is still fresh before committing the transaction.
        token::refresh_if_stale(self.portal, session, &path).await;

        let mut failover = FailoverController::new();
        let booked = failover.execute(self.portal, session, target).await;
        let outcome = if booked.success {
            if booked.confirmed {
                AttemptOutcome::Booked
            } else {
                AttemptOutcome::BookedUnconfirmed
            }
        } else {
            AttemptOutcome::Rejected
        };
        DayResult {
            date: target.date,
            window: target.window,
            outcome,
            court: booked.court,
            booking_ref: booked.booking_ref,
        }
    }

    pub async fn run_week(&self, session: &mut Session, targets: &[BookingTarget]) -> WeeklyReport {
        let mut report = WeeklyReport::default();
        for (index, target) in targets.iter().enumerate() {
            info!(
                "[{}/{}] attempting {} {}",
                index + 1,
                targets.len(),
                target.day_name(),
                target.date_field()
            );
            let day = self.run_day(session, target).await;
            if day.outcome.is_success() {
                info!(
                    "{} booked ({})",
                    day.day_name(),
                    day.court.as_deref().unwrap_or("court unspecified")
                );
            } else {
                warn!("{} failed: {}", day.day_name(), day.outcome.label());
            }
            report.days.push(day);
            let remaining = targets.len() - index - 1;
            if remaining > 0 {
                info!("continuing to the next day ({remaining} remaining)");
            }
        }
        report
    }

    /// The venue page renders no facility links until the venue opens; keep
    /// fetching the listing until links appear or the budget runs out.
    async fn resolve_facilities(&self, target: &BookingTarget) -> Option<Vec<Facility>> {
        let budget = self.poll_settings.timeout.min(VENUE_POLL_CAP);
        let started = Instant::now();
        let mut checks: u32 = 0;
        let _ = self.portal.booking_home().await;
        loop {
            match self
                .portal
                .facility_list(&target.venue_encoded, &target.region)
                .await
            {
                Ok(page) => {
                    let facilities = markup::facilities(&page.body);
                    if !facilities.is_empty() {
                        if checks > 0 {
                            info!(
                                "venue opened after {:?}, {} facilities listed",
                                started.elapsed(),
                                facilities.len()
                            );
                        } else {
                            info!("{} facilities listed", facilities.len());
                        }
                        return Some(facilities);
                    }
                }
                Err(e) => warn!("facility listing fetch failed: {e:#}"),
            }
            checks += 1;
            if started.elapsed() >= budget {
                error!("venue never opened within {budget:?} ({checks} checks)");
                return None;
            }
            if checks % 20 == 0 {
                let secs = started.elapsed().as_secs();
                info!(
                    "[{:02}:{:02}] waiting for the venue to open ({checks} checks)",
                    secs / 60,
                    secs % 60
                );
            }
            if self.cancel.is_cancelled() {
                warn!("facility listing poll cancelled");
                return None;
            }
            sleep(VENUE_POLL_INTERVAL).await;
        }
    }
}
