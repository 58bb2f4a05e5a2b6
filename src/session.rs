use std::time::Duration;

use log::{debug, info};
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    config::Credentials,
    markup,
    portal::{LoginForm, Portal},
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login page carried no key/value hidden fields")]
    TokenMissing,
    #[error("portal rejected the credentials")]
    CredentialsRejected,
    #[error("login endpoints unreachable: {0}")]
    Unreachable(String),
}

/// Authenticated context for one run. The cookie jar itself lives inside the
/// shared HTTP client; this value owns the anti-forgery token and its age.
/// Single owner: the run that authenticated it.
#[derive(Debug)]
pub struct Session {
    token: Option<SessionToken>,
}

#[derive(Debug)]
struct SessionToken {
    value: String,
    acquired_at: Instant,
}

impl Session {
    pub(crate) fn new() -> Self {
        Session { token: None }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|token| token.value.as_str())
    }

    pub fn set_token(&mut self, value: String) {
        self.token = Some(SessionToken {
            value,
            acquired_at: Instant::now(),
        });
    }

    /// True once the held token is older than the staleness window. A session
    /// with no token yet has nothing to refresh.
    pub fn token_stale(&self, window: Duration) -> bool {
        match &self.token {
            Some(token) => token.acquired_at.elapsed() >= window,
            None => false,
        }
    }
}

/// Two-step login: pull the one-time key/value pair off the login form, then
/// submit it together with the credentials. Authentication failure is fatal
/// to the run, so there is no retry here.
pub async fn authenticate(
    portal: &dyn Portal,
    credentials: &Credentials,
) -> Result<Session, AuthError> {
    info!("fetching login page");
    let page = portal
        .login_page()
        .await
        .map_err(|e| AuthError::Unreachable(format!("{e:#}")))?;

    let key = markup::hidden_input(&page.body, "key");
    let value = markup::hidden_input(&page.body, "value");
    let (Some(key), Some(value)) = (key, value) else {
        return Err(AuthError::TokenMissing);
    };
    debug!("extracted login key/value pair");

    let form = LoginForm {
        usrid: credentials.user_id.clone(),
        password: credentials.password.clone(),
        key,
        value,
        red: String::new(),
    };
    info!("submitting login");
    let response = portal
        .submit_login(&form)
        .await
        .map_err(|e| AuthError::Unreachable(format!("{e:#}")))?;

    if markup::logged_in(&response.url, &response.body) {
        info!("login successful");
        Ok(Session::new())
    } else {
        debug!("login landed on {} (HTTP {})", response.url, response.status);
        Err(AuthError::CredentialsRejected)
    }
}
