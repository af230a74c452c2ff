//! HTTP client for rollcalld.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub period_label: String,
    pub current_time: String,
    pub camera: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    pub name: String,
    pub state: String,
    pub marked_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
pub struct FrameReport {
    pub faces_detected: usize,
    pub recognized: Vec<Recognized>,
    pub attendance_updated: bool,
}

#[derive(Debug, Deserialize)]
pub struct Recognized {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
pub struct Learner {
    pub name: String,
    pub descriptors: usize,
}

#[derive(Deserialize)]
struct Message {
    message: String,
}

#[derive(Deserialize)]
struct Reloaded {
    loaded: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

pub struct DaemonClient {
    http: reqwest::Client,
    base: Url,
}

impl DaemonClient {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid daemon URL {base:?}"))?;
        if base.cannot_be_a_base() {
            bail!("invalid daemon URL {base}");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, segments: &[&str], form: Option<Form>) -> Result<T> {
        let url = self.endpoint(segments);
        tracing::debug!(%method, %url, "daemon request");
        let mut request = self.http.request(method, url);
        if let Some(form) = form {
            request = request.multipart(form);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("rollcalld not reachable at {}", self.base))?;
        decode(response).await
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.send(Method::GET, &["api", "attendance"], None).await
    }

    pub async fn reset(&self) -> Result<String> {
        let reply: Message = self.send(Method::POST, &["api", "attendance", "reset"], None).await?;
        Ok(reply.message)
    }

    pub async fn recognize(&self, frame: Vec<u8>, file_name: String) -> Result<FrameReport> {
        let form = Form::new().part("frame", Part::bytes(frame).file_name(file_name));
        self.send(Method::POST, &["api", "frames"], Some(form)).await
    }

    pub async fn enroll(&self, name: &str, photo: Vec<u8>, file_name: String, replace: bool) -> Result<String> {
        let form = Form::new()
            .text("name", name.to_string())
            .text("mode", if replace { "replace" } else { "append" })
            .part("photo", Part::bytes(photo).file_name(file_name));
        let reply: Message = self.send(Method::POST, &["api", "learners"], Some(form)).await?;
        Ok(reply.message)
    }

    pub async fn learners(&self) -> Result<Vec<Learner>> {
        self.send(Method::GET, &["api", "learners"], None).await
    }

    pub async fn remove(&self, name: &str) -> Result<String> {
        let reply: Message = self.send(Method::DELETE, &["api", "learners", name], None).await?;
        Ok(reply.message)
    }

    pub async fn reload(&self) -> Result<usize> {
        let reply: Reloaded = self.send(Method::POST, &["api", "gallery", "reload"], None).await?;
        Ok(reply.loaded)
    }

    pub async fn restart_camera(&self) -> Result<String> {
        let reply: Message = self.send(Method::POST, &["api", "camera", "restart"], None).await?;
        Ok(reply.message)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.context("reading daemon response")?;
    if !status.is_success() {
        return Err(match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => anyhow!("{} ({}, {status})", body.message, body.error),
            Err(_) => anyhow!("rollcalld returned {status}"),
        });
    }
    serde_json::from_slice(&bytes).context("unexpected response from rollcalld")
}
