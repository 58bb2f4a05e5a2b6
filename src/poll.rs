use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    config::BookingTarget,
    markup,
    portal::{AvailabilityForm, Portal},
    session::Session,
    token::{self, CalendarPath},
};

/// Terminal states of one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Available,
    TimedOut,
    Cancelled,
}

/// Per-probe classification. `Unknown` covers network hiccups and unexpected
/// statuses; it never terminates the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Available,
    Taken,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

const PROGRESS_EVERY: u64 = 60;

/// Probes the slot at a fixed interval until it opens, the timeout elapses,
/// or the orchestrator cancels the run. Availability windows are externally
/// time-boxed, so there is no adaptive backoff here. Each tick first gives
/// the token resolver a chance to refresh a stale token; a failed refresh is
/// non-fatal and simply recurs on the next tick.
pub async fn poll(
    portal: &dyn Portal,
    session: &mut Session,
    target: &BookingTarget,
    path: &CalendarPath,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> PollOutcome {
    let started = Instant::now();
    let mut probes: u64 = 0;
    info!(
        "polling {} {}-{} (timeout {:?}, interval {:?})",
        target.date_field(),
        target.window.start_field(),
        target.window.end_field(),
        settings.timeout,
        settings.interval,
    );
    loop {
        if cancel.is_cancelled() {
            warn!("polling cancelled after {probes} probes");
            return PollOutcome::Cancelled;
        }
        let elapsed = started.elapsed();
        if elapsed >= settings.timeout {
            info!("poll timed out after {elapsed:?} ({probes} probes)");
            return PollOutcome::TimedOut;
        }

        token::refresh_if_stale(portal, session, path).await;

        probes += 1;
        match probe(portal, target).await {
            SlotState::Available => {
                info!("slot available, detected after {elapsed:?} ({probes} probes)");
                return PollOutcome::Available;
            }
            SlotState::Taken => debug!("slot still taken"),
            SlotState::Unknown => warn!("probe inconclusive, continuing"),
        }

        if probes % PROGRESS_EVERY == 0 {
            let secs = started.elapsed().as_secs();
            info!("[{:02}:{:02}] still polling ({probes} probes)", secs / 60, secs % 60);
        }

        tokio::select! {
            _ = sleep(settings.interval) => {}
            _ = cancel.cancelled() => {
                warn!("polling cancelled after {probes} probes");
                return PollOutcome::Cancelled;
            }
        }
    }
}

async fn probe(portal: &dyn Portal, target: &BookingTarget) -> SlotState {
    let form = AvailabilityForm {
        jmula: target.window.start_field(),
        jtamat: target.window.end_field(),
        idfasiliti: target.primary.facility_num,
        tjkid: target.primary.tjk_id,
        tarikhmula: target.date_field(),
    };
    match portal.check_slot(&form).await {
        Ok(response) if response.is_success() => {
            if markup::slot_available(&response.body) {
                SlotState::Available
            } else {
                SlotState::Taken
            }
        }
        Ok(response) => {
            warn!("availability probe returned HTTP {}", response.status);
            SlotState::Unknown
        }
        Err(e) => {
            warn!("availability probe failed: {e:#}");
            SlotState::Unknown
        }
    }
}
