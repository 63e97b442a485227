use super::{negotiation::upload_request, Error, PackReceiver, References, Result};
use crate::Sha1Hash;
use futures_util::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const USER_AGENT: &str = concat!("git/2.0 (smartgit/", env!("CARGO_PKG_VERSION"), ")");

const UPLOAD_PACK_REQUEST: &str = "application/x-git-upload-pack-request";
const UPLOAD_PACK_RESULT: &str = "application/x-git-upload-pack-result";

/// HTTP client settings for talking to a remote.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub user_agent: String,
    pub timeout: Option<Duration>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

/// A smart-HTTP remote repository.
#[derive(Debug, Clone)]
pub struct Remote {
    url: String,
    client: Client,
}

impl Remote {
    pub fn new(url: &str, config: &RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url: normalize_url(url),
            client: builder.build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `GET info/refs?service=git-upload-pack`.
    pub async fn discover_refs(&self) -> Result<References> {
        let url = format!("{}/info/refs?service=git-upload-pack", self.url);
        info!(%url, "Discovering references");

        let res = check_status(self.client.get(&url).send().await?)?;
        let body = res.bytes().await?;
        let refs = References::parse(&body)?;

        debug!(
            refs = refs.len(),
            capabilities = %refs.capabilities().join(" "),
            "reference advertisement"
        );
        Ok(refs)
    }

    /// `POST git-upload-pack` asking for `want`, returning the packfile bytes.
    pub async fn fetch_pack(&self, want: &Sha1Hash) -> Result<Vec<u8>> {
        let url = format!("{}/git-upload-pack", self.url);
        info!(%url, %want, "Fetching packfile");

        let res = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static(UPLOAD_PACK_REQUEST))
            .header(ACCEPT, HeaderValue::from_static(UPLOAD_PACK_RESULT))
            .body(upload_request(want))
            .send()
            .await?;
        let res = check_status(res)?;

        match res.headers().get(CONTENT_TYPE) {
            Some(value) if value == UPLOAD_PACK_RESULT => {}
            other => warn!(content_type = ?other, "unexpected upload-pack response type"),
        }

        let mut receiver = PackReceiver::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            receiver.feed(&chunk?)?;
        }

        let pack = receiver.finish()?;
        info!(bytes = pack.len(), "Received packfile");
        Ok(pack)
    }
}

fn check_status(res: Response) -> Result<Response> {
    match res.status() {
        StatusCode::OK => Ok(res),
        status => Err(Error::RemoteStatus(status.as_u16())),
    }
}

/// Trims trailing slashes and appends `.git` when missing.
pub(crate) fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with(".git") {
        url.to_string()
    } else {
        format!("{url}.git")
    }
}
