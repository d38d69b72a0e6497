use std::{path::Path, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{
    error::{ForgeError, ForgeResult},
    parts::PartsMetadata,
    presets::BonePreset,
    roster::CharacterSpec,
    skeleton::SkeletonDoc,
};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted, extra limbs";
pub const DEFAULT_SAMPLER: &str = "DPM++ 2M Karras";
pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_CANVAS: u32 = 1024;
pub const DEFAULT_CFG_SCALE: f64 = 7.0;

/// Base URL of the text-to-image service: `SD_API_URL` or the local default.
pub fn default_api_url() -> String {
    std::env::var("SD_API_URL").unwrap_or_else(|_| "http://localhost:7860".to_string())
}

/// Typed result of one external service invocation. Timeouts are their own
/// arm so the driver can report them distinctly from plain failures; both
/// route onto the procedural fallback path.
#[derive(Clone, Debug)]
pub enum ServiceOutcome<T> {
    Success(T),
    Failure(String),
    TimedOut,
}

/// Wire payload for the text-to-image endpoint.
#[derive(Clone, Debug, serde::Serialize)]
pub struct IllustrationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f64,
    pub sampler_name: String,
}

impl IllustrationRequest {
    /// Builds the request for a character, honoring generation overrides the
    /// spec may carry in its extra fields (`steps`, `width`, `height`,
    /// `cfg_scale`, `sampler`). CSV input delivers those as strings, so
    /// numeric overrides are accepted in either form.
    pub fn from_spec(spec: &CharacterSpec) -> Self {
        Self {
            prompt: build_prompt(spec),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            steps: extra_u32(spec, "steps", DEFAULT_STEPS),
            width: extra_u32(spec, "width", DEFAULT_CANVAS),
            height: extra_u32(spec, "height", DEFAULT_CANVAS),
            cfg_scale: extra_f64(spec, "cfg_scale", DEFAULT_CFG_SCALE),
            sampler_name: extra_str(spec, "sampler", DEFAULT_SAMPLER),
        }
    }
}

/// Positive prompt: style, description, expression, and the fixed quality
/// suffix, with empty segments dropped.
pub fn build_prompt(spec: &CharacterSpec) -> String {
    let style = if spec.style.is_empty() { "anime" } else { &spec.style };
    let mut segments = vec![format!("{style} style")];
    if !spec.description.is_empty() {
        segments.push(spec.description.clone());
    }
    if !spec.emotion.is_empty() {
        segments.push(format!("expression: {}", spec.emotion));
    }
    segments.push("high quality, detailed, game character".to_string());
    segments.join(", ")
}

fn extra_u32(spec: &CharacterSpec, key: &str, default: u32) -> u32 {
    match spec.extra.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_u64().map(|v| v as u32).unwrap_or(default),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn extra_f64(spec: &CharacterSpec, key: &str, default: f64) -> f64 {
    match spec.extra.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn extra_str(spec: &CharacterSpec, key: &str, default: &str) -> String {
    match spec.extra.get(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        _ => default.to_string(),
    }
}

/// Text-to-image capability: prompt in, PNG bytes out.
pub trait IllustrationService {
    fn generate(&self, request: &IllustrationRequest) -> ServiceOutcome<Vec<u8>>;
}

/// Part-extraction capability: illustration in, named crops + metadata out.
pub trait SegmentationService {
    fn segment(&self, illustration: &Path, parts_dir: &Path) -> ServiceOutcome<PartsMetadata>;
}

/// Auto-rigging capability: parts + preset in, skeleton document out.
pub trait RiggingService {
    fn rig(&self, parts: &PartsMetadata, preset: &BonePreset) -> ServiceOutcome<SkeletonDoc>;
}

/// Stable Diffusion WebUI client for the illustration stage.
pub struct StableDiffusionClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl StableDiffusionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ForgeResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::service(format!("build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

impl IllustrationService for StableDiffusionClient {
    fn generate(&self, request: &IllustrationRequest) -> ServiceOutcome<Vec<u8>> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url.trim_end_matches('/'));
        let response = match self.client.post(&url).json(request).send() {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ServiceOutcome::TimedOut,
            Err(e) => return ServiceOutcome::Failure(format!("request to '{url}' failed: {e}")),
        };

        if !response.status().is_success() {
            return ServiceOutcome::Failure(format!(
                "'{url}' returned HTTP {}",
                response.status().as_u16()
            ));
        }

        let body: TxtToImgResponse = match response.json() {
            Ok(body) => body,
            Err(e) => return ServiceOutcome::Failure(format!("decode response: {e}")),
        };
        let Some(first) = body.images.first() else {
            return ServiceOutcome::Failure("response contained no images".to_string());
        };
        match BASE64.decode(first) {
            Ok(bytes) => ServiceOutcome::Success(bytes),
            Err(e) => ServiceOutcome::Failure(format!("decode base64 image: {e}")),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TxtToImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Placeholder for integrations that are not wired up in this deployment
/// (AI segmentation, third-party auto-rigging). Always reports failure,
/// which routes the pipeline onto its procedural fallbacks.
pub struct Unavailable(pub &'static str);

impl IllustrationService for Unavailable {
    fn generate(&self, _request: &IllustrationRequest) -> ServiceOutcome<Vec<u8>> {
        ServiceOutcome::Failure(format!("{} not configured", self.0))
    }
}

impl SegmentationService for Unavailable {
    fn segment(&self, _illustration: &Path, _parts_dir: &Path) -> ServiceOutcome<PartsMetadata> {
        ServiceOutcome::Failure(format!("{} not configured", self.0))
    }
}

impl RiggingService for Unavailable {
    fn rig(&self, _parts: &PartsMetadata, _preset: &BonePreset) -> ServiceOutcome<SkeletonDoc> {
        ServiceOutcome::Failure(format!("{} not configured", self.0))
    }
}

/// The full set of external collaborators the driver talks to.
pub struct Services {
    pub illustration: Box<dyn IllustrationService>,
    pub segmentation: Box<dyn SegmentationService>,
    pub rigging: Box<dyn RiggingService>,
}

impl Services {
    /// No external services at all; every stage uses its fallback (or is
    /// skipped, for illustration, which has none).
    pub fn offline() -> Self {
        Self {
            illustration: Box::new(Unavailable("illustration service")),
            segmentation: Box::new(Unavailable("segmentation service")),
            rigging: Box::new(Unavailable("rigging service")),
        }
    }

    /// Illustration over HTTP; segmentation and rigging stay procedural.
    pub fn with_illustration_api(base_url: impl Into<String>, timeout: Duration) -> ForgeResult<Self> {
        Ok(Self {
            illustration: Box::new(StableDiffusionClient::new(base_url, timeout)?),
            segmentation: Box::new(Unavailable("segmentation service")),
            rigging: Box::new(Unavailable("rigging service")),
        })
    }
}
