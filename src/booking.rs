use log::{info, warn};

use crate::{
    config::{BookingPrice, BookingTarget, ResourceIds, booking_price},
    markup,
    portal::{BookingForm, Portal},
    session::Session,
};

/// Which identifier set actually got booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChoice {
    Primary,
    Alternate,
}

/// Terminal record of one booking transaction. Immutable once produced.
#[derive(Debug, Clone)]
pub struct BookingResult {
    pub success: bool,
    pub court: Option<String>,
    pub booking_ref: Option<String>,
    pub http_status: u16,
    pub resource: ResourceChoice,
    pub confirmed: bool,
}

impl BookingResult {
    fn rejected(resource: ResourceChoice, http_status: u16) -> Self {
        BookingResult {
            success: false,
            court: None,
            booking_ref: None,
            http_status,
            resource,
            confirmed: false,
        }
    }
}

/// Submits the reservation and, when a booking reference is visible, confirms
/// it — at most once. A missing reference or a failed confirmation degrades
/// the result instead of failing it: the portal creates the reservation
/// server-side ("ghost cart") even when the client-visible confirmation step
/// errors. Failures return `success: false` without raising; the caller
/// decides whether to fail over.
pub async fn book_and_confirm(
    portal: &dyn Portal,
    session: &Session,
    target: &BookingTarget,
    ids: &ResourceIds,
    resource: ResourceChoice,
) -> BookingResult {
    let Some(token) = session.token() else {
        warn!("no session token held, cannot submit a booking");
        return BookingResult::rejected(resource, 0);
    };
    let price = booking_price(&target.window);
    let form = BookingForm::new(target, ids, token, &price);
    info!(
        "submitting booking: {} {}-{} on {} (RM{})",
        target.date_field(),
        target.window.start_field(),
        target.window.end_field(),
        ids.label,
        price.total,
    );
    let response = match portal.submit_booking(&form).await {
        Ok(response) => response,
        Err(e) => {
            warn!("booking request failed: {e:#}");
            return BookingResult::rejected(resource, 0);
        }
    };

    if !booking_accepted(&response.url, &response.body) {
        info!(
            "booking rejected (HTTP {}, landed on {})",
            response.status, response.url
        );
        return BookingResult::rejected(resource, response.status);
    }

    let booking_ref = markup::booking_ref(&response.body);
    let confirmed = match &booking_ref {
        Some(reference) => confirm(portal, reference, &price).await,
        None => {
            warn!("booking accepted but no reference was visible, skipping confirmation");
            false
        }
    };
    // Without a reference we cannot say which row on the portal is ours, so
    // the court stays unspecified.
    let court = booking_ref.as_ref().map(|_| ids.label.clone());
    BookingResult {
        success: true,
        court,
        booking_ref,
        http_status: response.status,
        resource,
        confirmed,
    }
}

/// Success is signalled by the redirect target, not the status code: the
/// handler lands on an "added" location (or says "berjaya" inline).
fn booking_accepted(final_url: &str, body: &str) -> bool {
    final_url.contains("added") || body.to_lowercase().contains("berjaya")
}

async fn confirm(portal: &dyn Portal, booking_ref: &str, price: &BookingPrice) -> bool {
    info!("confirming booking {booking_ref}");
    match portal.confirm_booking(booking_ref, &price.total.to_string()).await {
        Ok(response)
            if response.url.to_lowercase().contains("verified") || response.status == 200 =>
        {
            info!("booking confirmed");
            true
        }
        Ok(response) => {
            warn!(
                "confirmation not acknowledged (HTTP {}, landed on {})",
                response.status, response.url
            );
            false
        }
        Err(e) => {
            warn!("confirmation request failed: {e:#}");
            false
        }
    }
}
