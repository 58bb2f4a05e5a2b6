use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response, header};
use serde::Serialize;

use crate::config::{BookingPrice, BookingTarget, ResourceIds};

pub const BASE_URL: &str = "https://stf.kbs.gov.my";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What a portal round-trip leaves behind: final status, the URL we ended up
/// on after redirects, and the rendered body.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

#[derive(Debug, Serialize)]
pub struct LoginForm {
    pub usrid: String,
    pub password: String,
    pub key: String,
    pub value: String,
    pub red: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityForm {
    pub jmula: String,
    pub jtamat: String,
    pub idfasiliti: u32,
    pub tjkid: u32,
    pub tarikhmula: String,
}

/// The booking handler's full form, field names as captured off the wire.
#[derive(Debug, Serialize)]
pub struct BookingForm {
    #[serde(rename = "tt_jeniskadar")]
    pub rate_kind: String,
    #[serde(rename = "tt_tarikh_mula")]
    pub date: String,
    #[serde(rename = "date-picker1")]
    pub date_picker1: String,
    #[serde(rename = "date-picker2")]
    pub date_picker2: String,
    #[serde(rename = "masa_mula")]
    pub start: String,
    #[serde(rename = "masa_tamat")]
    pub end: String,
    #[serde(rename = "tt_jumlah_jam")]
    pub hours: String,
    #[serde(rename = "tt_jumlah_hari")]
    pub days: String,
    #[serde(rename = "tt_jumlah")]
    pub total: String,
    #[serde(rename = "jamsiang")]
    pub rate_day: String,
    #[serde(rename = "jammalam")]
    pub rate_night: String,
    #[serde(rename = "jamsiangbw")]
    pub rate_day_noncitizen: String,
    #[serde(rename = "jammalambw")]
    pub rate_night_noncitizen: String,
    #[serde(rename = "sehari")]
    pub rate_daily: String,
    #[serde(rename = "seharibw")]
    pub rate_daily_noncitizen: String,
    #[serde(rename = "warga")]
    pub citizen: String,
    #[serde(rename = "tt_jum_pengguna")]
    pub num_users: String,
    #[serde(rename = "tt_tujuan")]
    pub purpose: String,
    pub ks_token: String,
    pub ks_scriptname: String,
    pub red: String,
    #[serde(rename = "idvanue")]
    pub venue_num: String,
    #[serde(rename = "idfasiliti")]
    pub facility_num: String,
    #[serde(rename = "tjkid")]
    pub tjk_id: String,
    #[serde(rename = "kodneg")]
    pub region: String,
    pub btnsubmit: String,
}

impl BookingForm {
    pub fn new(
        target: &BookingTarget,
        ids: &ResourceIds,
        token: &str,
        price: &BookingPrice,
    ) -> Self {
        BookingForm {
            rate_kind: "1".to_string(),
            date: target.date_field(),
            date_picker1: String::new(),
            date_picker2: String::new(),
            start: target.window.start_field(),
            end: target.window.end_field(),
            hours: price.hours.to_string(),
            days: String::new(),
            total: price.total.to_string(),
            rate_day: "10.00".to_string(),
            rate_night: "15.00".to_string(),
            rate_day_noncitizen: "15.00".to_string(),
            rate_night_noncitizen: "20.00".to_string(),
            rate_daily: "200.00".to_string(),
            rate_daily_noncitizen: "250.00".to_string(),
            citizen: "1".to_string(),
            num_users: target.num_users.clone(),
            purpose: target.purpose.clone(),
            ks_token: token.to_string(),
            ks_scriptname: "tempahan_addcal".to_string(),
            red: String::new(),
            venue_num: target.venue_num.to_string(),
            facility_num: ids.facility_num.to_string(),
            tjk_id: ids.tjk_id.to_string(),
            region: target.region.clone(),
            btnsubmit: String::new(),
        }
    }
}

/// The portal's HTML surface, one method per endpoint. Everything above this
/// trait works on `PageResponse` values, so tests can script a fake portal.
#[async_trait]
pub trait Portal: Send + Sync {
    async fn login_page(&self) -> Result<PageResponse>;
    async fn submit_login(&self, form: &LoginForm) -> Result<PageResponse>;
    async fn booking_home(&self) -> Result<PageResponse>;
    async fn facility_list(&self, venue: &str, region: &str) -> Result<PageResponse>;
    async fn calendar_page(&self, venue: &str, facility: &str, region: &str)
    -> Result<PageResponse>;
    async fn check_slot(&self, form: &AvailabilityForm) -> Result<PageResponse>;
    async fn submit_booking(&self, form: &BookingForm) -> Result<PageResponse>;
    async fn confirm_booking(&self, booking_ref: &str, total: &str) -> Result<PageResponse>;
}

/// Live HTTP implementation. The cookie store is the session: every call made
/// through one client shares the authenticated context.
pub struct PortalClient {
    client: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = ClientBuilder::new()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn into_page(response: Response) -> Result<PageResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;
        Ok(PageResponse { status, url, body })
    }
}

#[async_trait]
impl Portal for PortalClient {
    async fn login_page(&self) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.url("/ks_user/login.php"))
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn submit_login(&self, form: &LoginForm) -> Result<PageResponse> {
        let response = self
            .client
            .post(self.url("/ks_user/login_handler.php"))
            .form(form)
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn booking_home(&self) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.url("/t_tempahan/tempahan_home.php"))
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn facility_list(&self, venue: &str, region: &str) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.url("/t_tempahan/tempahan_listfasiliti.php"))
            .query(&[("id", venue), ("neg", region)])
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn calendar_page(
        &self,
        venue: &str,
        facility: &str,
        region: &str,
    ) -> Result<PageResponse> {
        // The calendar only renders the token when reached from the listing.
        let referer = format!(
            "{}/t_tempahan/tempahan_listfasiliti.php?id={venue}&neg={region}",
            self.base_url
        );
        let response = self
            .client
            .get(self.url("/t_tempahan/tempahan_addcal.php"))
            .query(&[("id", venue), ("idf", facility), ("neg", region)])
            .header(header::REFERER, referer)
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn check_slot(&self, form: &AvailabilityForm) -> Result<PageResponse> {
        let response = self
            .client
            .post(self.url("/check.php"))
            .form(form)
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn submit_booking(&self, form: &BookingForm) -> Result<PageResponse> {
        let response = self
            .client
            .post(self.url("/t_tempahan/tempahan_addhandler.php"))
            .form(form)
            .send()
            .await?;
        Self::into_page(response).await
    }

    async fn confirm_booking(&self, booking_ref: &str, total: &str) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.url("/t_tempahan/prosestempahan_modifyhandler2.php"))
            .query(&[("idp", booking_ref), ("idv", "1"), ("tot", total)])
            .send()
            .await?;
        Self::into_page(response).await
    }
}
