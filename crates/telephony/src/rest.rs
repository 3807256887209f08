//! Call-control REST client.
//!
//! HTTP basic auth with the operator's account credentials. All calls from
//! the live call path are dispatched fire-and-forget; nothing here is on the
//! audio hot path.

use serde::Deserialize;

use crate::TelephonyError;

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Deserialize)]
pub struct CreatedCall {
    pub sid: String,
}

#[derive(Clone)]
pub struct TelephonyClient {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

impl TelephonyClient {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Point the client at a different API host (tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn calls_url(&self, suffix: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls{suffix}",
            self.api_base, self.account_sid
        )
    }

    /// Place an outbound call. `url` is the TwiML endpoint the provider
    /// fetches when the callee answers; status callbacks track progress.
    pub async fn create_call(
        &self,
        to: &str,
        from: &str,
        url: &str,
        status_callback: &str,
    ) -> Result<CreatedCall, TelephonyError> {
        let resp = self
            .http
            .post(self.calls_url(".json"))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", from),
                ("Url", url),
                ("StatusCallback", status_callback),
                ("StatusCallbackEvent", "initiated ringing answered completed"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected { status, body });
        }
        Ok(resp.json().await?)
    }

    /// Replace the in-flight TwiML for a live call (auto-press redirect).
    pub async fn redirect_twiml(&self, call_sid: &str, twiml: &str) -> Result<(), TelephonyError> {
        let resp = self
            .http
            .post(self.calls_url(&format!("/{call_sid}.json")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", twiml)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected { status, body });
        }
        Ok(())
    }

    /// Force-complete (hang up) a live call.
    pub async fn complete_call(&self, call_sid: &str) -> Result<(), TelephonyError> {
        let resp = self
            .http
            .post(self.calls_url(&format!("/{call_sid}.json")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected { status, body });
        }
        Ok(())
    }

    /// Fetch bytes with the client's auth (recordings live behind it).
    pub(crate) async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TelephonyError> {
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected { status, body });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
