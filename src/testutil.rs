//! Scripted stand-in for the portal so timing and failover behaviour can be
//! exercised without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::{BookingTarget, Credentials, ResourceIds, TargetSpec, TimeWindow};
use crate::portal::{AvailabilityForm, BookingForm, LoginForm, PageResponse, Portal};
use crate::session::Session;
use crate::token::CalendarPath;

pub const LOGIN_PAGE: &str = concat!(
    r#"<form method="post" action="login_handler.php">"#,
    r#"<input type="hidden" name="key" value="k123">"#,
    r#"<input type="hidden" name="value" value="v456">"#,
    r#"</form>"#,
);

pub const LISTING_PAGE: &str = concat!(
    r#"<a href="tempahan_addcal.php?id=VENUE9&idf=FAC1=&neg=07">Gelanggang Tenis 1</a>"#,
    r#"<a href="tempahan_addcal.php?id=VENUE9&idf=FAC2=&neg=07">Gelanggang Tenis 2</a>"#,
);

pub const CALENDAR_PAGE: &str =
    r#"<input type="hidden" name="ks_token" value="abcdef0123456789abcdef0123456789">"#;

pub const BOOKED_URL: &str = "https://portal/t_tempahan/prosestempahan_list.php?msg=added";
pub const BOOKED_PAGE: &str =
    r#"<a href="prosestempahan_modifyhandler2.php?idp=7341">Tempahan berjaya</a>"#;
pub const REJECTED_URL: &str = "https://portal/t_tempahan/tempahan_addcal.php?msg=ralat";
pub const TAKEN_BODY: &str = "Tiada slot kosong";

#[derive(Clone)]
pub enum Scripted {
    Page(PageResponse),
    Error(&'static str),
}

pub fn page(status: u16, url: &str, body: &str) -> PageResponse {
    PageResponse {
        status,
        url: url.to_string(),
        body: body.to_string(),
    }
}

/// One scripted endpoint: queued responses consumed in order, then an
/// optional fallback repeated forever. Every call is counted.
#[derive(Default)]
pub struct Endpoint {
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<Scripted>>,
    hits: AtomicU32,
}

impl Endpoint {
    pub fn push_page(&self, status: u16, url: &str, body: &str) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Scripted::Page(page(status, url, body)));
    }

    pub fn push_error(&self, message: &'static str) {
        self.queue.lock().unwrap().push_back(Scripted::Error(message));
    }

    pub fn set_fallback_page(&self, status: u16, url: &str, body: &str) {
        *self.fallback.lock().unwrap() = Some(Scripted::Page(page(status, url, body)));
    }

    pub fn set_fallback_error(&self, message: &'static str) {
        *self.fallback.lock().unwrap() = Some(Scripted::Error(message));
    }

    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
        *self.fallback.lock().unwrap() = None;
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<PageResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone());
        match entry {
            Some(Scripted::Page(page)) => Ok(page),
            Some(Scripted::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("endpoint has no scripted response left")),
        }
    }
}

#[derive(Default)]
pub struct FakePortal {
    pub login_pages: Endpoint,
    pub logins: Endpoint,
    pub homes: Endpoint,
    pub listings: Endpoint,
    pub calendars: Endpoint,
    pub checks: Endpoint,
    pub bookings: Endpoint,
    pub confirms: Endpoint,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A portal scripted far enough for a full happy-path walk: login works,
    /// the listing shows two facilities, the calendar carries a token.
    pub fn with_happy_navigation() -> Self {
        let portal = Self::new();
        portal
            .login_pages
            .set_fallback_page(200, "https://portal/ks_user/login.php", LOGIN_PAGE);
        portal
            .logins
            .set_fallback_page(200, "https://portal/ks_user/home.php", "Selamat Datang");
        portal
            .homes
            .set_fallback_page(200, "https://portal/t_tempahan/tempahan_home.php", "");
        portal.listings.set_fallback_page(
            200,
            "https://portal/t_tempahan/tempahan_listfasiliti.php",
            LISTING_PAGE,
        );
        portal.calendars.set_fallback_page(
            200,
            "https://portal/t_tempahan/tempahan_addcal.php",
            CALENDAR_PAGE,
        );
        portal
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn login_page(&self) -> Result<PageResponse> {
        self.login_pages.next()
    }

    async fn submit_login(&self, _form: &LoginForm) -> Result<PageResponse> {
        self.logins.next()
    }

    async fn booking_home(&self) -> Result<PageResponse> {
        self.homes.next()
    }

    async fn facility_list(&self, _venue: &str, _region: &str) -> Result<PageResponse> {
        self.listings.next()
    }

    async fn calendar_page(
        &self,
        _venue: &str,
        _facility: &str,
        _region: &str,
    ) -> Result<PageResponse> {
        self.calendars.next()
    }

    async fn check_slot(&self, _form: &AvailabilityForm) -> Result<PageResponse> {
        self.checks.next()
    }

    async fn submit_booking(&self, _form: &BookingForm) -> Result<PageResponse> {
        self.bookings.next()
    }

    async fn confirm_booking(&self, _booking_ref: &str, _total: &str) -> Result<PageResponse> {
        self.confirms.next()
    }
}

pub fn test_credentials() -> Credentials {
    Credentials {
        user_id: "910101011234".to_string(),
        password: "hunter2".to_string(),
    }
}

pub fn test_spec(with_alternate: bool) -> TargetSpec {
    TargetSpec {
        venue_encoded: "VENUE9".to_string(),
        venue_num: 2,
        region: "07".to_string(),
        facility_index: 0,
        primary: ResourceIds {
            facility_encoded: "FAC1=".to_string(),
            facility_num: 114,
            tjk_id: 624,
            label: "Gelanggang Tenis 1".to_string(),
        },
        alternate: with_alternate.then(|| ResourceIds {
            facility_encoded: "FAC2=".to_string(),
            facility_num: 202,
            tjk_id: 625,
            label: "Gelanggang Tenis 2".to_string(),
        }),
        num_users: "4".to_string(),
        purpose: "4".to_string(),
    }
}

pub fn test_target(with_alternate: bool) -> BookingTarget {
    test_spec(with_alternate).target_for(
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        TimeWindow::parse("19:00:00", "21:00:00").unwrap(),
    )
}

pub fn test_path() -> CalendarPath {
    CalendarPath {
        venue: "VENUE9".to_string(),
        facility: "FAC1=".to_string(),
        region: "07".to_string(),
    }
}

pub fn test_session() -> Session {
    Session::new()
}

pub fn test_session_with_token() -> Session {
    let mut session = Session::new();
    session.set_token("abcdef0123456789abcdef0123456789".to_string());
    session
}
