use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::sleep;

use crate::{markup, portal::Portal, session::Session};

/// How old a resolved token may grow before long-running polls refresh it.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(40 * 60);

const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("calendar page kept failing; gave up after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
    #[error("calendar page carried no recognisable session token")]
    PatternsExhausted,
}

/// Navigation coordinates for the calendar page that carries the token. The
/// encoded facility id comes fresh from the listing, not from the CLI.
#[derive(Debug, Clone)]
pub struct CalendarPath {
    pub venue: String,
    pub facility: String,
    pub region: String,
}

/// Resolves the anti-forgery token and stores it on the session. This is the
/// one layer that must ride out upstream instability, so transient failures
/// (5xx, network errors, pattern misses) are retried with exponential backoff
/// before surfacing.
pub async fn resolve(
    portal: &dyn Portal,
    session: &mut Session,
    path: &CalendarPath,
) -> Result<(), TokenError> {
    let mut pattern_miss = false;
    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            let backoff = BACKOFF_BASE * (1 << (attempt - 2));
            debug!("retrying token resolution in {backoff:?} (attempt {attempt}/{MAX_ATTEMPTS})");
            sleep(backoff).await;
        }
        match fetch_calendar(portal, path).await {
            Ok(body) => match markup::session_token(&body) {
                Some(token) => {
                    info!("resolved session token");
                    session.set_token(token);
                    return Ok(());
                }
                None => {
                    pattern_miss = true;
                    warn!("no token pattern matched the calendar page (attempt {attempt}/{MAX_ATTEMPTS})");
                }
            },
            Err(e) => warn!("calendar fetch failed (attempt {attempt}/{MAX_ATTEMPTS}): {e:#}"),
        }
    }
    if pattern_miss {
        Err(TokenError::PatternsExhausted)
    } else {
        Err(TokenError::ExhaustedRetries {
            attempts: MAX_ATTEMPTS,
        })
    }
}

/// The token only renders after the home -> listing -> calendar walk; the two
/// lead-in pages just prime the server-side referrer state, so their own
/// failures don't matter.
async fn fetch_calendar(portal: &dyn Portal, path: &CalendarPath) -> anyhow::Result<String> {
    let _ = portal.booking_home().await;
    let _ = portal.facility_list(&path.venue, &path.region).await;
    let page = portal
        .calendar_page(&path.venue, &path.facility, &path.region)
        .await?;
    if !page.is_success() {
        anyhow::bail!("calendar page returned HTTP {}", page.status);
    }
    Ok(page.body)
}

/// No-op under the staleness window. A refresh failure mid-poll is swallowed:
/// the stale token is retried on the following cycle, and the server may well
/// still accept it.
pub async fn refresh_if_stale(portal: &dyn Portal, session: &mut Session, path: &CalendarPath) {
    if !session.token_stale(STALENESS_WINDOW) {
        return;
    }
    info!("session token older than {STALENESS_WINDOW:?}, refreshing");
    if let Err(e) = resolve(portal, session, path).await {
        warn!("token refresh failed, keeping stale token: {e}");
    }
}
