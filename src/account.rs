use anyhow::{Context, Result};
use log::{info, warn};

use crate::api::ApiClient;
use crate::auth::{AuthClient, SignedIn};
use crate::error::ApiError;
use crate::models::{Session, User};
use crate::prefs::{ACCESS_TOKEN, Prefs, USER_ID};

/// Sign-in state, persisted in the preference store between runs.
pub struct Account {
    auth: AuthClient,
    prefs: Prefs,
    pub user: Option<User>,
    pub error_message: Option<String>,
}

impl Account {
    pub fn new(auth: AuthClient, prefs: Prefs) -> Self {
        Account {
            auth,
            prefs,
            user: None,
            error_message: None,
        }
    }

    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.prefs.get(ACCESS_TOKEN)
    }

    pub fn user_id(&self) -> Result<Option<String>> {
        self.prefs.get(USER_ID)
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.access_token()?.is_some())
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<User> {
        self.error_message = None;
        let session = match self.auth.sign_in(email, password).await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        self.remember(session)
    }

    /// Returns the user and whether a session was opened. Providers that
    /// require email confirmation open none.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(User, bool)> {
        self.error_message = None;
        match self.auth.sign_up(email, password, display_name).await {
            Ok(SignedIn::Session(session)) => Ok((self.remember(session)?, true)),
            Ok(SignedIn::PendingConfirmation(user)) => {
                info!("Sign-up for {} awaits email confirmation", user.id);
                self.user = Some(user.clone());
                Ok((user, false))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Ends the session. A token the provider no longer accepts counts as
    /// signed out.
    pub async fn sign_out(&mut self) -> Result<()> {
        if let Some(token) = self.access_token()? {
            match self.auth.sign_out(&token).await {
                Ok(()) => {}
                Err(ApiError::Auth(reason)) => warn!("Provider rejected sign-out: {reason}"),
                Err(e) => return Err(self.fail(e)),
            }
        }
        self.prefs.remove(ACCESS_TOKEN)?;
        self.prefs.remove(USER_ID)?;
        self.user = None;
        info!("Signed out");
        Ok(())
    }

    /// The signed-in user: backend profile first, auth provider second.
    pub async fn whoami(&mut self, api: &ApiClient) -> Result<Option<User>> {
        let Some(token) = self.access_token()? else {
            return Ok(None);
        };
        let user = match api.user_profile().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Profile lookup failed ({e}), asking the auth provider");
                match self.auth.current_user(&token).await {
                    Ok(user) => user,
                    Err(e) => return Err(self.fail(e)),
                }
            }
        };
        self.user = Some(user.clone());
        Ok(Some(user))
    }

    fn remember(&mut self, session: Session) -> Result<User> {
        self.prefs
            .set(USER_ID, &session.user.id)
            .context("Failed to store user id")?;
        self.prefs
            .set(ACCESS_TOKEN, &session.access_token)
            .context("Failed to store access token")?;
        self.user = Some(session.user.clone());
        Ok(session.user)
    }

    fn fail(&mut self, e: ApiError) -> anyhow::Error {
        self.error_message = Some(e.to_string());
        e.into()
    }
}
