use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use shared::{
    error::SwapError,
    protocol::{error_text, RawResponse},
};

use crate::object_url::{ObjectUrlGuard, ObjectUrlRegistry};

const BARE_BASE64_PREFIX: &str = "data:image/png;base64,";

/// A displayable image. Object URLs are released when the reference is dropped.
#[derive(Debug)]
pub enum ImageRef {
    DataUrl(String),
    ObjectUrl(ObjectUrlGuard),
}

impl ImageRef {
    pub fn src(&self) -> &str {
        match self {
            Self::DataUrl(url) => url,
            Self::ObjectUrl(guard) => guard.url(),
        }
    }

    pub fn to_bytes(&self) -> Result<(Option<String>, Vec<u8>), SwapError> {
        match self {
            Self::DataUrl(url) => decode_data_url(url)
                .ok_or_else(|| SwapError::UnsupportedFormat("malformed data url".to_string())),
            Self::ObjectUrl(guard) => guard
                .blob()
                .map(|blob| (blob.mime_type, blob.bytes.to_vec()))
                .ok_or_else(|| SwapError::Render(format!("{} was already released", guard.url()))),
        }
    }
}

#[derive(Debug, PartialEq)]
enum ResponseShape {
    RemoteError(String),
    DataUrl(String),
    Base64(String),
    Binary {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    Unsupported(String),
}

fn decode(raw: Option<RawResponse>) -> Result<ResponseShape, SwapError> {
    let object = match raw {
        None => return Err(SwapError::Protocol("no response data from API".to_string())),
        Some(RawResponse::Binary { bytes, mime_type }) => {
            return Ok(if bytes.is_empty() {
                ResponseShape::Unsupported("empty binary payload".to_string())
            } else {
                ResponseShape::Binary { bytes, mime_type }
            });
        }
        Some(RawResponse::Json(Value::Object(object))) => object,
        Some(RawResponse::Json(other)) => {
            return Err(SwapError::Protocol(format!(
                "expected an object, got {}",
                describe(&other)
            )));
        }
    };

    if let Some(message) = object.get("error").and_then(error_text) {
        return Ok(ResponseShape::RemoteError(message));
    }

    let Some(payload) = object.get("data") else {
        return Ok(ResponseShape::Unsupported("response has no data".to_string()));
    };

    Ok(match single_output(payload) {
        Value::String(text) if text.starts_with("data:") => ResponseShape::DataUrl(text.clone()),
        Value::String(text) if !text.is_empty() => ResponseShape::Base64(text.clone()),
        other => ResponseShape::Unsupported(describe(other)),
    })
}

fn single_output(payload: &Value) -> &Value {
    match payload {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(text) if text.is_empty() => "empty string".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("list of {} items", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

pub fn normalize(
    raw: Option<RawResponse>,
    registry: &ObjectUrlRegistry,
) -> Result<ImageRef, SwapError> {
    match decode(raw)? {
        ResponseShape::RemoteError(message) => Err(SwapError::Remote(message)),
        ResponseShape::DataUrl(url) => Ok(ImageRef::DataUrl(url)),
        ResponseShape::Base64(payload) => {
            Ok(ImageRef::DataUrl(format!("{BARE_BASE64_PREFIX}{payload}")))
        }
        ResponseShape::Binary { bytes, mime_type } => {
            Ok(ImageRef::ObjectUrl(registry.create(bytes, mime_type)))
        }
        ResponseShape::Unsupported(shape) => Err(SwapError::UnsupportedFormat(shape)),
    }
}

pub fn decode_data_url(url: &str) -> Option<(Option<String>, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    let media_type = (!media_type.is_empty()).then(|| media_type.to_string());
    Some((media_type, bytes))
}

#[cfg(test)]
#[path = "tests/normalizer_tests.rs"]
mod tests;
