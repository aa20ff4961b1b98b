use std::{collections::BTreeSet, fmt};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_MODE_TAG: &str = "Compare";
pub const TARGET_UPLOAD_NAME: &str = "target.png";
pub const SOURCE_UPLOAD_NAME: &str = "source.png";

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Ratio(u8);

impl Ratio {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u8>().ok().and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Ratio {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ValidationError::InvalidRatios)
    }
}

impl From<Ratio> for u8 {
    fn from(value: Ratio) -> Self {
        value.0
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub type ModeTags = BTreeSet<String>;

pub fn default_mode_tags() -> ModeTags {
    BTreeSet::from([DEFAULT_MODE_TAG.to_string()])
}

#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub target_image: ImageFile,
    pub source_image: ImageFile,
    pub anonymization_ratio: Ratio,
    pub adversarial_ratio: Ratio,
    pub mode: ModeTags,
}

impl SwapRequest {
    /// Validates raw form values. Images are checked before ratios.
    pub fn from_form(
        target_image: Option<ImageFile>,
        source_image: Option<ImageFile>,
        anonymization_ratio: &str,
        adversarial_ratio: &str,
        mode: ModeTags,
    ) -> Result<Self, ValidationError> {
        let (Some(target_image), Some(source_image)) = (target_image, source_image) else {
            return Err(ValidationError::MissingImages);
        };

        let (Some(anonymization_ratio), Some(adversarial_ratio)) = (
            Ratio::parse(anonymization_ratio),
            Ratio::parse(adversarial_ratio),
        ) else {
            return Err(ValidationError::InvalidRatios);
        };

        Ok(Self {
            target_image,
            source_image,
            anonymization_ratio,
            adversarial_ratio,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> ImageFile {
        ImageFile::new(name, None, vec![1, 2, 3])
    }

    #[test]
    fn every_in_range_pair_validates_when_both_images_present() {
        for a in 0..=100u8 {
            for b in 0..=100u8 {
                let request = SwapRequest::from_form(
                    Some(image("t.png")),
                    Some(image("s.png")),
                    &a.to_string(),
                    &b.to_string(),
                    default_mode_tags(),
                )
                .expect("in-range ratios must validate");
                assert_eq!(request.anonymization_ratio.get(), a);
                assert_eq!(request.adversarial_ratio.get(), b);

                let missing = SwapRequest::from_form(
                    None,
                    Some(image("s.png")),
                    &a.to_string(),
                    &b.to_string(),
                    default_mode_tags(),
                );
                assert!(matches!(missing, Err(ValidationError::MissingImages)));
            }
        }
    }

    #[test]
    fn rejects_out_of_range_and_non_numeric_ratios() {
        for (anon, adv) in [
            ("101", "0"),
            ("0", "-1"),
            ("abc", "50"),
            ("50", ""),
            ("12.5", "3"),
            ("256", "1"),
        ] {
            let err = SwapRequest::from_form(
                Some(image("t.png")),
                Some(image("s.png")),
                anon,
                adv,
                default_mode_tags(),
            )
            .expect_err("must reject");
            assert!(
                matches!(err, ValidationError::InvalidRatios),
                "unexpected error for ({anon}, {adv}): {err:?}"
            );
        }
    }

    #[test]
    fn missing_images_are_reported_before_bad_ratios() {
        let err = SwapRequest::from_form(None, None, "999", "x", default_mode_tags())
            .expect_err("must reject");
        assert!(matches!(err, ValidationError::MissingImages));
    }

    #[test]
    fn ratio_parse_trims_whitespace() {
        assert_eq!(Ratio::parse(" 42 ").map(Ratio::get), Some(42));
        assert_eq!(Ratio::new(100).map(Ratio::get), Some(100));
        assert!(Ratio::new(101).is_none());
    }

    #[test]
    fn data_url_defaults_to_png() {
        let file = ImageFile::new("a", None, b"hi".to_vec());
        assert_eq!(file.to_data_url(), "data:image/png;base64,aGk=");

        let jpeg = ImageFile::new("b", Some("image/jpeg".into()), b"hi".to_vec());
        assert!(jpeg.to_data_url().starts_with("data:image/jpeg;base64,"));
    }
}
