//! Source-site adapter (reqwest).
//!
//! Implements the `sentinel-core` FeedSource port against the site's
//! notifications endpoint, authenticating every call with the session blob.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT},
    RequestBuilder, StatusCode,
};

use sentinel_core::{
    credentials::SessionCredential, domain::NotificationId, errors::Error, source::FeedSource,
    Result,
};

const CSRF_HEADER: &str = "x-csrf-token";
const REQUESTED_WITH_HEADER: &str = "x-requested-with";

#[derive(Clone, Debug)]
pub struct SiteClient {
    notifications_url: String,
    http: reqwest::Client,
}

impl SiteClient {
    pub fn new(notifications_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            notifications_url: notifications_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn mark_read_url(&self, id: &NotificationId) -> String {
        format!("{}/{}/read", self.notifications_url, id)
    }

    pub fn delete_url(&self, id: &NotificationId) -> String {
        format!("{}/{}", self.notifications_url, id)
    }

    async fn send(&self, req: RequestBuilder, cred: &SessionCredential) -> Result<reqwest::Response> {
        let resp = req
            .headers(auth_headers(cred)?)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(resp.status())?;
        Ok(resp)
    }
}

fn auth_headers(cred: &SessionCredential) -> Result<HeaderMap> {
    let value = |v: &str, name: &str| {
        HeaderValue::from_str(v)
            .map_err(|e| Error::External(format!("invalid {name} in session blob: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, value(&cred.cookie_header(), "cookies")?);
    headers.insert(USER_AGENT, value(cred.user_agent(), "user agent")?);
    headers.insert(CSRF_HEADER, value(&cred.csrf_token, "csrf token")?);
    headers.insert(
        REQUESTED_WITH_HEADER,
        HeaderValue::from_static("XMLHttpRequest"),
    );
    Ok(headers)
}

fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        // 419 is Laravel's "page expired" (stale CSRF token).
        401 | 403 | 419 => Err(Error::NotAuthenticated),
        code => Err(Error::Http { status: code }),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::External(format!("request timed out: {e}"));
    }
    Error::External(format!("request error: {e}"))
}

#[async_trait]
impl FeedSource for SiteClient {
    async fn fetch_feed(&self, cred: &SessionCredential) -> Result<String> {
        let resp = self
            .send(self.http.get(&self.notifications_url), cred)
            .await?;
        resp.text().await.map_err(map_reqwest_error)
    }

    async fn fetch_thumbnail(&self, cred: &SessionCredential, url: &str) -> Result<Vec<u8>> {
        let resp = self.send(self.http.get(url), cred).await?;
        let bytes = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok(bytes.to_vec())
    }

    async fn mark_read(&self, cred: &SessionCredential, id: &NotificationId) -> Result<()> {
        self.send(self.http.post(self.mark_read_url(id)), cred)
            .await?;
        tracing::info!(notif_id = %id, "notification marked as read on source site");
        Ok(())
    }

    async fn delete(&self, cred: &SessionCredential, id: &NotificationId) -> Result<()> {
        self.send(
            self.http
                .post(self.delete_url(id))
                .form(&[("_method", "DELETE")]),
            cred,
        )
        .await?;
        tracing::info!(notif_id = %id, "notification deleted on source site");
        Ok(())
    }
}
