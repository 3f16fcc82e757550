#![doc = "Facebook Graph API publisher: bridges the core `Publisher` trait to the page video upload endpoint."]
//
//! # Graph publisher (CLI <-> Core)
//!
//! [`GraphClient`] implements [`media_relay_core::contract::Publisher`] by
//! posting one multipart request per video to
//! `<graph_url>/<graph_version>/<page_id>/videos`.
//!
//! - Construct with [`GraphClient::new_from_env`] (`FACEBOOK_PAGE_ID`,
//!   `FACEBOOK_PAGE_ACCESS_TOKEN`) or [`GraphClient::new`] for explicit values.
//! - The access token travels in the form body, never in the URL, so transport
//!   errors and logs cannot leak it.
//! - A reply carrying an `error` object is a rejection even when the HTTP status
//!   is 200. Nothing is retried here.

use std::env;
use std::path::Path;

use async_trait::async_trait;
use media_relay_core::config::PublishPolicy;
use media_relay_core::contract::{LocalMediaFile, Publisher, RemoteVideo};
use media_relay_core::error::PublishError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

pub struct GraphClient {
    http: reqwest::Client,
    page_id: String,
    access_token: String,
    policy: PublishPolicy,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("page_id", &self.page_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(
        page_id: impl Into<String>,
        access_token: impl Into<String>,
        policy: PublishPolicy,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout())
            .build()?;
        Ok(Self {
            http,
            page_id: page_id.into(),
            access_token: access_token.into(),
            policy,
        })
    }

    pub fn new_from_env(
        policy: PublishPolicy,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        match (
            env::var("FACEBOOK_PAGE_ID"),
            env::var("FACEBOOK_PAGE_ACCESS_TOKEN"),
        ) {
            (Ok(page_id), Ok(token)) if !page_id.is_empty() && !token.is_empty() => {
                tracing::info!(
                    page_id = %page_id,
                    token_set = true,
                    "Initialized GraphClient from environment"
                );
                Self::new(page_id, token, policy)
            }
            (Ok(_), Ok(_)) => {
                tracing::error!("FACEBOOK_PAGE_ID or FACEBOOK_PAGE_ACCESS_TOKEN is empty");
                Err("FACEBOOK_PAGE_ID and FACEBOOK_PAGE_ACCESS_TOKEN must not be empty".into())
            }
            (Err(e), _) => {
                tracing::error!(error = ?e, "FACEBOOK_PAGE_ID missing in environment");
                Err(format!("FACEBOOK_PAGE_ID: {e}").into())
            }
            (_, Err(e)) => {
                tracing::error!(error = ?e, "FACEBOOK_PAGE_ACCESS_TOKEN missing in environment");
                Err(format!("FACEBOOK_PAGE_ACCESS_TOKEN: {e}").into())
            }
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}/videos",
            self.policy.graph_url.trim_end_matches('/'),
            self.policy.graph_version,
            self.page_id
        )
    }

    async fn form(&self, file: &LocalMediaFile, caption: &str) -> Result<Form, PublishError> {
        let handle = tokio::fs::File::open(&file.path).await?;
        let source = Part::stream_with_length(reqwest::Body::from(handle), file.size)
            .file_name(file_name(&file.path))
            .mime_str("video/mp4")
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let mut form = Form::new()
            .text("access_token", self.access_token.clone())
            .text("published", self.policy.published.to_string());
        if let Some(description) = self.policy.caption.apply(caption) {
            form = form.text("description", description.to_string());
        }
        if let Some(privacy) = &self.policy.privacy {
            form = form.text(
                "privacy",
                serde_json::json!({ "value": privacy }).to_string(),
            );
        }
        Ok(form.part("source", source))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string())
}

#[derive(Debug, Deserialize)]
struct GraphReply {
    id: Option<String>,
    video_id: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
    code: Option<i64>,
}

/// Decide the outcome of a video upload from the raw reply.
///
/// An embedded `error` object wins over the HTTP status.
pub fn interpret_reply(status: u16, body: &str) -> Result<RemoteVideo, PublishError> {
    let reply: Option<GraphReply> = serde_json::from_str(body).ok();

    if let Some(GraphReply {
        error: Some(error), ..
    }) = &reply
    {
        return Err(PublishError::Rejected {
            code: error.code,
            message: error
                .message
                .clone()
                .unwrap_or_else(|| "unspecified error".to_string()),
        });
    }
    if !(200..300).contains(&status) {
        return Err(PublishError::Status {
            status,
            body: body.chars().take(512).collect(),
        });
    }
    match reply.and_then(|r| r.id.or(r.video_id)) {
        Some(id) if !id.is_empty() => Ok(RemoteVideo { id }),
        _ => Err(PublishError::MalformedResponse(body.chars().take(512).collect())),
    }
}

#[async_trait]
impl Publisher for GraphClient {
    async fn publish(
        &self,
        file: &LocalMediaFile,
        caption: &str,
    ) -> Result<RemoteVideo, PublishError> {
        tracing::info!(
            page_id = %self.page_id,
            path = %file.path.display(),
            bytes = file.size,
            "Uploading video to page"
        );
        let form = self.form(file, caption).await?;

        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Transport error uploading video");
                PublishError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        match interpret_reply(status, &body) {
            Ok(video) => {
                tracing::info!(remote_id = %video.id, "Successfully published video");
                Ok(video)
            }
            Err(e) => {
                tracing::error!(status, error = %e, "Graph API did not accept the video");
                Err(e)
            }
        }
    }
}
