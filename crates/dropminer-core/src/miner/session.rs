// ── Session establishment ──
//
// Find or mint an access token, validate it, and persist the result in
// the cookie file. A rejected token clears the stored session and the
// whole flow runs once more before giving up.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use dropminer_api::{AUTH_TOKEN_COOKIE, COOKIE_DOMAIN, PERSISTENT_COOKIE};

use super::Miner;
use crate::error::CoreError;
use crate::login;

const LOGIN_ATTEMPTS: usize = 2;

impl Miner {
    /// Make sure a validated session exists and return its user id.
    pub(crate) async fn check_login(&self) -> Result<u64, CoreError> {
        {
            let session = self.inner.session.lock().await;
            if let (Some(_), Some(user_id)) = (&session.access_token, session.user_id) {
                return Ok(user_id);
            }
        }

        self.inner.prompt.update("Logging in...", None);
        for attempt in 1..=LOGIN_ATTEMPTS {
            let token = self.session_token().await?;
            let validation = self.inner.backend.validate(&token).await?;
            match validation.status {
                200 => {
                    let Some(user_id) = validation.user_id else {
                        return Err(CoreError::LoginVerification {
                            message: "validation response carried no user id".into(),
                        });
                    };
                    self.store_session(token, user_id).await;
                    return Ok(user_id);
                }
                401 => {
                    warn!(attempt, "stored session was rejected");
                    self.inner
                        .cookies
                        .lock()
                        .await
                        .store
                        .clear_domain(COOKIE_DOMAIN);
                    self.inner.session.lock().await.access_token = None;
                }
                status => {
                    return Err(CoreError::LoginVerification {
                        message: format!("unexpected validation status {status}"),
                    });
                }
            }
        }

        Err(CoreError::LoginVerification {
            message: format!("session rejected {LOGIN_ATTEMPTS} times"),
        })
    }

    /// The token to validate: a fresh login when no session cookie exists,
    /// otherwise the cached token or the one stored in the cookie.
    async fn session_token(&self) -> Result<SecretString, CoreError> {
        let stored = self
            .inner
            .cookies
            .lock()
            .await
            .store
            .get(COOKIE_DOMAIN, AUTH_TOKEN_COOKIE)
            .map(str::to_owned);

        let Some(stored) = stored else {
            let inner = &self.inner;
            let token = login::login(
                inner.backend.as_ref(),
                inner.prompt.as_ref(),
                inner.presenter.as_ref(),
            )
            .await?;
            inner.cookies.lock().await.store.set(
                COOKIE_DOMAIN,
                AUTH_TOKEN_COOKIE,
                token.expose_secret(),
            );
            return Ok(token);
        };

        if let Some(cached) = &self.inner.session.lock().await.access_token {
            return Ok(SecretString::from(cached.expose_secret().to_owned()));
        }
        debug!("restoring session from cookie");
        Ok(SecretString::from(stored))
    }

    async fn store_session(&self, token: SecretString, user_id: u64) {
        let inner = &self.inner;
        {
            let mut cookies = inner.cookies.lock().await;
            cookies
                .store
                .set(COOKIE_DOMAIN, PERSISTENT_COOKIE, user_id.to_string());
            cookies
                .store
                .set(COOKIE_DOMAIN, AUTH_TOKEN_COOKIE, token.expose_secret());
            if let Err(e) = cookies.save() {
                warn!(error = %e, "failed to save cookies");
            }
        }

        let copy = || SecretString::from(token.expose_secret().to_owned());
        inner.backend.set_access_token(Some(copy())).await;
        inner.pool.set_auth_token(Some(copy())).await;
        {
            let mut session = inner.session.lock().await;
            session.access_token = Some(token);
            session.user_id = Some(user_id);
        }

        inner.prompt.update("Logged in", Some(user_id));
        info!(user_id, "logged in");
    }
}
