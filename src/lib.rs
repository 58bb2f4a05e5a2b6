mod booking;
mod config;
mod failover;
pub mod markup;
mod notify;
mod orchestrator;
mod poll;
mod portal;
mod session;
#[cfg(test)]
mod testutil;
mod token;

pub use booking::{BookingResult, ResourceChoice, book_and_confirm};
pub use config::{
    BookingPrice, BookingTarget, Credentials, CredentialsEnv, Facility, LoadFromEnv, ResourceIds,
    TargetSpec, TimeWindow, auto_target, booking_price, default_window, myt_today,
    single_day_target, weekly_targets,
};
pub use failover::{FailoverController, FailoverState};
pub use notify::Notifier;
pub use orchestrator::{AttemptOutcome, DayResult, Orchestrator, WeeklyReport};
pub use poll::{PollOutcome, PollSettings, poll};
pub use portal::{PageResponse, Portal, PortalClient};
pub use session::{AuthError, Session, authenticate};
pub use token::{CalendarPath, STALENESS_WINDOW, TokenError, refresh_if_stale, resolve};
