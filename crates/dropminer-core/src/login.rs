// ── Credential login flow ──
//
// Drives the interactive login form against the passport endpoint until
// an access token comes back. CAPTCHA and unknown error codes are fatal;
// everything else clears the relevant field and asks again.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use dropminer_api::CLIENT_ID;
use dropminer_api::models::{CaptchaProof, LoginRequest};

use crate::backend::Backend;
use crate::error::CoreError;
use crate::presenter::{LoginField, LoginPrompt, Presenter};

/// Submissions per form fill; the second one carries a second factor.
const SUBMIT_ATTEMPTS: usize = 2;

mod code {
    pub const CAPTCHA: u32 = 1000;
    pub const BAD_CREDENTIALS: u32 = 3001;
    pub const AUTHY_REQUIRED: u32 = 3011;
    pub const BAD_AUTHY: u32 = 3012;
    pub const EMAIL_REQUIRED: u32 = 3022;
    pub const BAD_EMAIL: u32 = 3023;
}

/// Run the login form until the backend grants an access token.
pub async fn login(
    backend: &dyn Backend,
    prompt: &dyn LoginPrompt,
    presenter: &dyn Presenter,
) -> Result<SecretString, CoreError> {
    debug!("login flow started");
    let mut captcha: Option<CaptchaProof> = None;

    loop {
        let input = prompt.ask_login().await?;
        let mut request = LoginRequest {
            client_id: CLIENT_ID.to_owned(),
            username: input.username,
            password: input.password.expose_secret().to_owned(),
            undelete_user: false,
            remember_me: true,
            authy_token: None,
            twitchguard_code: None,
            captcha: captcha.clone(),
        };

        for _ in 0..SUBMIT_ATTEMPTS {
            let response = backend.login(&request).await?;

            if let Some(proof) = response.captcha_proof {
                let proof = CaptchaProof { proof };
                request.captcha = Some(proof.clone());
                captcha = Some(proof);
            }

            if let Some(error_code) = response.error_code {
                debug!(error_code, "login error");
                match error_code {
                    code::CAPTCHA => return Err(CoreError::CaptchaRequired),
                    code::BAD_CREDENTIALS => {
                        presenter.print("Incorrect username or password.");
                        prompt.clear(LoginField::Password);
                        break;
                    }
                    code::BAD_AUTHY | code::BAD_EMAIL => {
                        presenter.print(if error_code == code::BAD_EMAIL {
                            "Incorrect email code."
                        } else {
                            "Incorrect 2FA code."
                        });
                        prompt.clear(LoginField::Token);
                        break;
                    }
                    code::AUTHY_REQUIRED | code::EMAIL_REQUIRED => {
                        let email = error_code == code::EMAIL_REQUIRED;
                        let Some(token) = input.token.clone() else {
                            presenter.print(if email {
                                "Email code required. Check your email."
                            } else {
                                "2FA token required."
                            });
                            break;
                        };
                        if email {
                            request.twitchguard_code = Some(token);
                        } else {
                            request.authy_token = Some(token);
                        }
                        continue;
                    }
                    _ => {
                        return Err(CoreError::Login {
                            message: response
                                .error
                                .unwrap_or_else(|| format!("error code {error_code}")),
                        });
                    }
                }
            }

            if let Some(token) = response.access_token {
                debug!("access token granted");
                prompt.clear(LoginField::All);
                return Ok(SecretString::from(token));
            }
        }
    }
}
