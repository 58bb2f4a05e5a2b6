//! Every heuristic that reads the portal's server-rendered HTML lives here,
//! so the rest of the engine never touches markup directly. The portal's
//! rendering varies by navigation path, hence the ordered pattern lists.

use regex::Regex;
use scraper::{Html, Selector};

use crate::config::Facility;

/// Value of a hidden `<input>` by name, tolerating both attribute orders.
pub fn hidden_input(html: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let patterns = [
        format!(r#"name=["']{name}["'][^>]*value=["']([^"']+)["']"#),
        format!(r#"value=["']([^"']+)["'][^>]*name=["']{name}["']"#),
    ];
    for pattern in &patterns {
        let re = Regex::new(pattern).expect("static hidden-input pattern");
        if let Some(caps) = re.captures(html) {
            let value = caps[1].to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// The anti-forgery `ks_token` from a calendar page. First matching pattern
/// wins; an empty match is a miss, never a token.
pub fn session_token(html: &str) -> Option<String> {
    let patterns = [
        r#"(?i)name=["']ks_token["'][^>]*value=["']([a-f0-9]+)["']"#,
        r#"(?i)value=["']([a-f0-9]+)["'][^>]*name=["']ks_token["']"#,
        r#"(?i)id=["']ks_token["'][^>]*value=["']([a-f0-9]+)["']"#,
        r#"(?i)ks_token["\s:]+["']([a-f0-9]{32})["']"#,
    ];
    for pattern in &patterns {
        let re = Regex::new(pattern).expect("static token pattern");
        if let Some(caps) = re.captures(html) {
            let token = caps[1].to_string();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    None
}

/// Whether the login landed in an authenticated context: either the handler
/// redirected home or the page carries one of the logged-in phrases.
pub fn logged_in(final_url: &str, body: &str) -> bool {
    let text = body.to_lowercase();
    final_url.contains("home.php")
        || text.contains("logout")
        || text.contains("log keluar")
        || text.contains("selamat datang")
}

/// Classifies a `check.php` body. The portal answers an open slot with an
/// empty body or "0"; a taken slot gets a "tiada" (none available) message.
pub fn slot_available(body: &str) -> bool {
    let text = body.trim().to_lowercase();
    matches!(text.as_str(), "" | "0" | "ok" | "available") || !text.contains("tiada")
}

/// Booking submissions only say "added" in the redirect; the numeric booking
/// reference has to be fished out of the bookings list the handler renders.
/// The highest idp is the newest row, i.e. ours.
pub fn booking_ref(html: &str) -> Option<String> {
    let re = Regex::new(r"modifyhandler2\.php\?idp=(\d+)").expect("static booking-ref pattern");
    re.captures_iter(html)
        .map(|caps| caps[1].to_string())
        .max_by_key(|id| id.parse::<u64>().unwrap_or(0))
}

/// Facility rows from the venue listing page: every `tempahan_addcal.php`
/// link carries a fresh encoded facility id. Falls back to scanning the raw
/// markup because some venue pages only emit the links inside scripts.
pub fn facilities(html: &str) -> Vec<Facility> {
    let re = Regex::new(r#"tempahan_addcal\.php\?id=([^&]+)&idf=([^&"']+)&neg=(\d+)"#)
        .expect("static facility-link pattern");

    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static anchor selector");
    let mut found: Vec<Facility> = document
        .select(&anchors)
        .filter_map(|node| node.value().attr("href"))
        .filter_map(|href| {
            re.captures(href).map(|caps| Facility {
                venue_encoded: caps[1].to_string(),
                facility_encoded: caps[2].to_string(),
                region: caps[3].to_string(),
            })
        })
        .collect();

    if found.is_empty() {
        found = re
            .captures_iter(html)
            .map(|caps| Facility {
                venue_encoded: caps[1].to_string(),
                facility_encoded: caps[2].to_string(),
                region: caps[3].to_string(),
            })
            .collect();
    }
    found
}
