//! Remote-repository backend: document content lives as one JSON file
//! per note in an externally hosted Git repository, and history is that
//! repository's commit log for the file. Speaks the hosting service's
//! REST API (contents + commits endpoints).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;
use vellum_core::{canonical_json, empty_tree};

use super::{DocumentHandle, DocumentMetadata, DocumentStore, HistoryEntry, RevisionMarker, SaveOutcome};
use crate::config::RepoConfig;
use crate::error::{Result, StoreError};

pub struct RepoStore {
    http: reqwest::Client,
    config: RepoConfig,
}

impl RepoStore {
    pub fn new(config: RepoConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| StoreError::Repo(format!("invalid token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("vellum"));

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { http, config })
    }

    fn content_path(handle: &DocumentHandle) -> String {
        handle
            .content_path
            .clone()
            .unwrap_or_else(|| format!("notes/{}.json", handle.note_id))
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base, self.config.owner, self.config.repo, path
        )
    }

    fn commits_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/commits",
            self.config.api_base, self.config.owner, self.config.repo
        )
    }

    /// File content and blob sha at `reference` (branch head when
    /// `None`). A missing file is not an error.
    async fn file_at(&self, path: &str, reference: Option<&str>) -> Result<Option<(Value, String)>> {
        let mut request = self.http.get(self.contents_url(path));
        if let Some(reference) = reference {
            request = request.query(&[("ref", reference)]);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body: ContentsResponse = response.json().await?;
        let encoded: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| StoreError::Repo(format!("content for {path} is not valid base64: {e}")))?;
        let tree = serde_json::from_slice(&raw)?;
        Ok(Some((tree, body.sha)))
    }

    /// Create or update `path`, returning the resulting commit id.
    async fn put_file(
        &self,
        path: &str,
        tree: &Value,
        message: &str,
        sha: Option<&str>,
    ) -> Result<String> {
        let body = PutContents {
            message,
            content: BASE64.encode(canonical_json(tree)),
            branch: &self.config.branch,
            sha,
        };
        let response = self
            .http
            .put(self.contents_url(path))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: PutResponse = response.json().await?;
        Ok(body.commit.sha)
    }

    /// Commits touching `path`, newest first, as the hosting API
    /// returns them.
    async fn commits_for(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let response = self
            .http
            .get(self.commits_url())
            .query(&[
                ("path", path),
                ("sha", self.config.branch.as_str()),
                ("per_page", "50"),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentStore for RepoStore {
    async fn create_document(
        &self,
        initial: &Value,
        metadata: DocumentMetadata,
    ) -> Result<DocumentHandle> {
        let note_id = metadata
            .note_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let handle = DocumentHandle {
            content_path: Some(format!("notes/{note_id}.json")),
            note_id,
        };
        let path = Self::content_path(&handle);
        let message = match &metadata.title {
            Some(title) => format!("Create note {} ({title})", handle.note_id),
            None => format!("Create note {}", handle.note_id),
        };
        let commit = self.put_file(&path, initial, &message, None).await?;
        debug!(note_id = %handle.note_id, %commit, "created note in repository");
        Ok(handle)
    }

    async fn save_content(
        &self,
        handle: &DocumentHandle,
        tree: &Value,
        author_id: Option<&str>,
        _op_id: Option<&str>,
    ) -> Result<SaveOutcome> {
        let path = Self::content_path(handle);
        let current = self.file_at(&path, None).await?;

        if let Some((current_tree, _)) = &current {
            if current_tree == tree {
                // Nothing changed; echo the head commit for the file
                // rather than recording an empty commit.
                if let Some(head) = self.commits_for(&path).await?.into_iter().next() {
                    return Ok(SaveOutcome {
                        marker: RevisionMarker::Commit(head.sha),
                        op_id: None,
                        time: Utc::now(),
                    });
                }
            }
        }

        let message = match author_id {
            Some(author) => format!("Update note {} ({author})", handle.note_id),
            None => format!("Update note {}", handle.note_id),
        };
        let sha = current.as_ref().map(|(_, sha)| sha.as_str());
        let commit = self.put_file(&path, tree, &message, sha).await?;
        Ok(SaveOutcome {
            marker: RevisionMarker::Commit(commit),
            op_id: None,
            time: Utc::now(),
        })
    }

    fn list_history<'a>(
        &'a self,
        handle: &'a DocumentHandle,
    ) -> BoxStream<'a, Result<HistoryEntry>> {
        Box::pin(async_stream::try_stream! {
            let path = Self::content_path(handle);
            let commits = self.commits_for(&path).await?;
            let total = commits.len() as u64;
            // Newest first from the API; ordinal runs 1 = oldest so
            // consumers can order without caring about stream order.
            for (index, info) in commits.into_iter().enumerate() {
                yield HistoryEntry {
                    marker: RevisionMarker::Commit(info.sha),
                    label: info.commit.message,
                    author: info.commit.author.as_ref().and_then(|a| a.name.clone()),
                    timestamp: info
                        .commit
                        .author
                        .as_ref()
                        .and_then(|a| a.date.as_deref())
                        .and_then(parse_commit_date)
                        .unwrap_or_else(Utc::now),
                    ordinal: total - index as u64,
                };
            }
        })
    }

    async fn fetch_at_revision(
        &self,
        handle: &DocumentHandle,
        marker: Option<&RevisionMarker>,
    ) -> Result<Value> {
        let path = Self::content_path(handle);
        let reference = match marker {
            None => None,
            Some(RevisionMarker::Commit(sha)) => Some(sha.as_str()),
            Some(other @ RevisionMarker::Revision(_)) => {
                return Err(StoreError::UnsupportedMarker {
                    marker: other.to_string(),
                })
            }
        };
        Ok(self
            .file_at(&path, reference)
            .await?
            .map(|(tree, _)| tree)
            .unwrap_or_else(empty_tree))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Repo(format!("{status}: {body}")))
}

fn parse_commit_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct CommitInfo {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<String>,
}
