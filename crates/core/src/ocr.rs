use crate::error::IngestError;
use crate::extractor::{EmbeddedImage, ImageData};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use url::Url;

pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

pub trait OcrEngine {
    fn name(&self) -> &str;
    fn recognize(&self, image: &EmbeddedImage) -> Result<String, IngestError>;
}

/// Image bytes in a container format OCR engines accept, with its MIME type.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

pub fn encode_for_ocr(image: &EmbeddedImage) -> Result<EncodedImage, IngestError> {
    match &image.data {
        ImageData::Jpeg(bytes) => Ok(EncodedImage {
            bytes: bytes.clone(),
            mime_type: "image/jpeg",
        }),
        ImageData::Jpeg2000(bytes) => Ok(EncodedImage {
            bytes: bytes.clone(),
            mime_type: "image/jp2",
        }),
        ImageData::Tiff(bytes) => Ok(EncodedImage {
            bytes: bytes.clone(),
            mime_type: "image/tiff",
        }),
        ImageData::Pixels {
            width,
            height,
            channels,
            samples,
        } => {
            let decoded = match *channels {
                1 => GrayImage::from_raw(*width, *height, samples.clone()).map(DynamicImage::ImageLuma8),
                3 => RgbImage::from_raw(*width, *height, samples.clone()).map(DynamicImage::ImageRgb8),
                _ => None,
            }
            .ok_or_else(|| {
                IngestError::UnsupportedImage(format!(
                    "{} samples do not fill a {width}x{height} image with {channels} channel(s)",
                    samples.len()
                ))
            })?;

            let mut png = Cursor::new(Vec::new());
            decoded.write_to(&mut png, ImageFormat::Png)?;
            Ok(EncodedImage {
                bytes: png.into_inner(),
                mime_type: "image/png",
            })
        }
        ImageData::Unsupported(reason) => Err(IngestError::UnsupportedImage(reason.clone())),
    }
}

/// Runs the `tesseract` binary, feeding the image on stdin.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub binary: String,
    pub language: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &EmbeddedImage) -> Result<String, IngestError> {
        let encoded = encode_for_ocr(image)?;

        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                IngestError::OcrFailed(format!("failed to execute {}: {error}", self.binary))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&encoded.bytes)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::OcrFailed(format!(
                "{} returned {} for page {}: {}",
                self.binary,
                output.status,
                image.page,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Reads `LLM_OCR_ENDPOINT` and `LLM_OCR_API_KEY`; `None` when no endpoint is set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    image_base64: String,
    mime_type: String,
    page: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    lines: Option<Vec<String>>,
}

/// Sends each image to a multimodal OCR endpoint as base64 JSON.
pub struct HttpOcr {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpOcr {
    pub fn new(config: OcrEndpointConfig) -> Result<Self, IngestError> {
        Ok(Self {
            endpoint: Url::parse(&config.endpoint)?,
            api_key: config.api_key,
            client: Client::new(),
        })
    }
}

impl OcrEngine for HttpOcr {
    fn name(&self) -> &str {
        "http"
    }

    fn recognize(&self, image: &EmbeddedImage) -> Result<String, IngestError> {
        let encoded = encode_for_ocr(image)?;
        let payload = OcrRequest {
            image_base64: STANDARD.encode(&encoded.bytes),
            mime_type: encoded.mime_type.to_string(),
            page: image.page,
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "OCR request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json()?;
        response_to_text(payload)
    }
}

fn response_to_text(payload: OcrResponse) -> Result<String, IngestError> {
    if let Some(text) = payload.text {
        return Ok(text);
    }

    if let Some(lines) = payload.lines {
        return Ok(lines.join(" "));
    }

    Err(IngestError::OcrFailed(
        "OCR response carried neither text nor lines".to_string(),
    ))
}
