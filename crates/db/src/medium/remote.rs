//! A CSV file per dataset in a remote Git repository, via the GitHub
//! contents API.
//!
//! The version token is the blob sha returned by the API. A conditional
//! write sends the expected sha; the remote rejects stale shas with 409, and
//! a create over an existing file with a 422 naming the missing sha. Both map
//! to [`MediumError::VersionConflict`].
//!
//! Files over the contents API size limit come back without inline content;
//! those are read through the git blob API using the same sha.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use taskmaster_core::codec::Row;
use taskmaster_core::version::VersionToken;

use super::{parse_csv, render_csv, Dataset, DurableMedium, MediumError, StoredTable};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_ACCEPT: &str = "application/vnd.github.v3+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw";

const USER_AGENT: &str = concat!("taskmaster/", env!("CARGO_PKG_VERSION"));

/// Where the dataset files live and how to authenticate.
#[derive(Debug, Clone)]
pub struct RemoteRepoConfig {
    /// API root, e.g. `https://api.github.com`.
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository holding the dataset files.
    pub path_prefix: String,
    pub token: String,
}

pub struct RemoteRepoMedium {
    client: reqwest::Client,
    config: RemoteRepoConfig,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    /// `base64` for inline content, `none` when the file is too large.
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsBlob,
}

#[derive(Debug, Deserialize)]
struct PutContentsBlob {
    sha: String,
}

impl RemoteRepoMedium {
    pub fn new(config: RemoteRepoConfig) -> Result<Self, MediumError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MediumError::unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn contents_url(&self, dataset: &Dataset) -> String {
        let prefix = self.config.path_prefix.trim_matches('/');
        let path = if prefix.is_empty() {
            dataset.file_name()
        } else {
            format!("{prefix}/{}", dataset.file_name())
        };
        format!(
            "{}/repos/{}/{}/contents/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
        )
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
        )
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", accept)
    }

    fn transport_error(err: reqwest::Error) -> MediumError {
        if err.is_timeout() {
            MediumError::unavailable("remote repository request timed out")
        } else {
            MediumError::unavailable(format!("remote repository request failed: {err}"))
        }
    }

    async fn status_error(response: reqwest::Response) -> MediumError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        MediumError::unavailable(format!("remote repository returned {status}: {snippet}"))
    }

    /// Current blob sha and decoded bytes, or `None` when the file is absent.
    async fn fetch(&self, dataset: &Dataset) -> Result<Option<(String, Vec<u8>)>, MediumError> {
        let response = self
            .authorized(self.client.get(self.contents_url(dataset)), JSON_ACCEPT)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(Self::transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => return Err(Self::status_error(response).await),
            _ => {}
        }

        let body: ContentsResponse = response.json().await.map_err(|e| MediumError::Malformed {
            field: "contents".into(),
            reason: format!("unexpected response from remote repository: {e}"),
        })?;

        let inline = match body.encoding.as_deref() {
            Some("base64") => true,
            None => !body.content.is_empty(),
            Some(_) => false,
        };
        let bytes = if inline {
            // The API wraps base64 at 60 columns.
            let packed: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(packed)
                .map_err(|e| MediumError::Malformed {
                    field: "contents".into(),
                    reason: format!("{} is not valid base64: {e}", dataset.file_name()),
                })?
        } else {
            tracing::debug!(
                dataset = dataset.name,
                sha = %body.sha,
                size = ?body.size,
                "Contents too large to inline, fetching blob"
            );
            self.fetch_blob(&body.sha).await?
        };

        if let Some(size) = body.size {
            if bytes.len() as u64 != size {
                return Err(MediumError::Malformed {
                    field: "contents".into(),
                    reason: format!(
                        "{} is {size} bytes but {} were received",
                        dataset.file_name(),
                        bytes.len()
                    ),
                });
            }
        }

        Ok(Some((body.sha, bytes)))
    }

    /// Raw bytes of the blob with the given sha.
    async fn fetch_blob(&self, sha: &str) -> Result<Vec<u8>, MediumError> {
        let url = format!("{}/git/blobs/{sha}", self.repo_url());
        let response = self
            .authorized(self.client.get(url), RAW_ACCEPT)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let bytes = response.bytes().await.map_err(Self::transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DurableMedium for RemoteRepoMedium {
    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn read(&self, dataset: &Dataset) -> Result<Option<StoredTable>, MediumError> {
        let Some((sha, bytes)) = self.fetch(dataset).await? else {
            return Ok(None);
        };
        let rows = parse_csv(dataset, &bytes)?;
        Ok(Some(StoredTable {
            rows,
            version: VersionToken::new(sha),
        }))
    }

    async fn write(
        &self,
        dataset: &Dataset,
        rows: &[Row],
        expected: Option<&VersionToken>,
        change_description: &str,
    ) -> Result<VersionToken, MediumError> {
        let csv = render_csv(dataset, rows);
        let request = PutContentsRequest {
            message: change_description,
            content: base64::engine::general_purpose::STANDARD.encode(csv.as_bytes()),
            branch: &self.config.branch,
            sha: expected.map(VersionToken::as_str),
        };

        let response = self
            .authorized(self.client.put(self.contents_url(dataset)), JSON_ACCEPT)
            .json(&request)
            .send()
            .await
            .map_err(Self::transport_error)?;

        match response.status() {
            StatusCode::CONFLICT => {
                tracing::debug!(dataset = dataset.name, "Remote repository rejected stale sha");
                return Err(MediumError::conflict(dataset));
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: ErrorResponse = response.json().await.unwrap_or_default();
                if body.message.contains("sha") {
                    tracing::debug!(
                        dataset = dataset.name,
                        message = %body.message,
                        "Remote repository rejected write without matching sha"
                    );
                    return Err(MediumError::conflict(dataset));
                }
                return Err(MediumError::unavailable(format!(
                    "remote repository rejected the write: {}",
                    body.message
                )));
            }
            status if !status.is_success() => return Err(Self::status_error(response).await),
            _ => {}
        }

        let body: PutContentsResponse =
            response.json().await.map_err(|e| MediumError::Malformed {
                field: "contents".into(),
                reason: format!("unexpected response from remote repository: {e}"),
            })?;

        tracing::info!(
            dataset = dataset.name,
            rows = rows.len(),
            sha = %body.content.sha,
            change = change_description,
            "Remote dataset committed"
        );
        Ok(VersionToken::new(body.content.sha))
    }

    async fn health_check(&self) -> Result<(), MediumError> {
        let response = self
            .authorized(self.client.get(self.repo_url()), JSON_ACCEPT)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }
}
