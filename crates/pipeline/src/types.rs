//! Shared value types for the Claude node domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (creativity is in `[0.0, 1.0]`, iteration counts
//! never exceed [`MAX_ITERATIONS`]) and participate in orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::InvalidConfiguration;

// ---------------------------------------------------------------------------
// Caps
// ---------------------------------------------------------------------------

/// Maximum number of refinement passes in one `refine` call.
pub const MAX_ITERATIONS: u32 = 3;

/// Maximum number of steps in one prompt chain.
pub const MAX_CHAIN_STEPS: usize = 3;

// ---------------------------------------------------------------------------
// Token counts
// ---------------------------------------------------------------------------

/// Number of tokens consumed by an LLM API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Creativity
// ---------------------------------------------------------------------------

/// How much latitude the model gets, in the range `[0.0, 1.0]`.
///
/// Sent to the provider as the sampling temperature and, for composed
/// prompts, turned into a textual hint.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64")]
pub struct Creativity(f64);

impl Creativity {
    /// Below this value composed prompts ask for factual output.
    pub const FACTUAL_BELOW: f64 = 0.3;

    /// Above this value composed prompts invite creative angles.
    pub const CREATIVE_ABOVE: f64 = 0.7;

    /// Creates a [`Creativity`], returning `None` if `value` is outside
    /// `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns the value as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if composed prompts should ask for factual output.
    pub fn is_factual(self) -> bool {
        self.0 < Self::FACTUAL_BELOW
    }

    /// Returns `true` if composed prompts should invite creative angles.
    pub fn is_creative(self) -> bool {
        self.0 > Self::CREATIVE_ABOVE
    }
}

impl TryFrom<f64> for Creativity {
    type Error = InvalidConfiguration;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            InvalidConfiguration::new("creativity", format!("{value} is outside [0.0, 1.0]"))
        })
    }
}

impl Default for Creativity {
    fn default() -> Self {
        Self(0.7)
    }
}

impl std::fmt::Display for Creativity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Iteration count
// ---------------------------------------------------------------------------

/// Number of refinement passes, in `0..=MAX_ITERATIONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32")]
pub struct IterationCount(u32);

impl IterationCount {
    /// Creates an [`IterationCount`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfiguration`] if `count` exceeds [`MAX_ITERATIONS`].
    pub fn new(count: u32) -> Result<Self, InvalidConfiguration> {
        if count > MAX_ITERATIONS {
            return Err(InvalidConfiguration::new(
                "iteration_count",
                format!("{count} exceeds the maximum of {MAX_ITERATIONS}"),
            ));
        }
        Ok(Self(count))
    }

    /// Returns the count as a `u32`.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` if no passes are requested.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u32> for IterationCount {
    type Error = InvalidConfiguration;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        Self::new(count)
    }
}

impl Default for IterationCount {
    fn default() -> Self {
        Self(1)
    }
}

impl std::fmt::Display for IterationCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Media types the vision endpoint accepts.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// An image attached to a completion request.
///
/// The host supplies the image already encoded as base64; this type only
/// carries it. Construction checks the media type and that data is present;
/// whether the bytes decode is for the provider to judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImageRefParts")]
pub struct ImageRef {
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ImageRefParts {
    #[serde(default = "default_media_type")]
    media_type: String,
    data: String,
}

fn default_media_type() -> String {
    "image/jpeg".to_string()
}

impl TryFrom<ImageRefParts> for ImageRef {
    type Error = InvalidConfiguration;

    fn try_from(parts: ImageRefParts) -> Result<Self, Self::Error> {
        Self::new(parts.media_type, parts.data)
    }
}

impl ImageRef {
    /// Creates an [`ImageRef`] from a media type and base64 payload.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfiguration`] if the media type is unsupported or
    /// the payload is empty.
    pub fn new(
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, InvalidConfiguration> {
        let media_type = media_type.into();
        let data = data.into();
        if !SUPPORTED_IMAGE_TYPES.contains(&media_type.as_str()) {
            return Err(InvalidConfiguration::unknown_choice(
                "media_type",
                &media_type,
                SUPPORTED_IMAGE_TYPES,
            ));
        }
        if data.trim().is_empty() {
            return Err(InvalidConfiguration::new("image", "image data is empty"));
        }
        Ok(Self { media_type, data })
    }

    /// Creates a JPEG [`ImageRef`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfiguration`] if the payload is empty.
    pub fn jpeg(data: impl Into<String>) -> Result<Self, InvalidConfiguration> {
        Self::new("image/jpeg", data)
    }

    /// Returns the media type (e.g. `"image/png"`).
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the base64 payload.
    pub fn data(&self) -> &str {
        &self.data
    }
}

// ---------------------------------------------------------------------------
// Few-shot examples
// ---------------------------------------------------------------------------

/// One input/output pair shown to the model before the main instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    /// Example input.
    pub input: String,
    /// Expected output for `input`.
    pub output: String,
}

impl FewShotExample {
    /// Creates a new example pair.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds elapsed between `earlier` and `self`, floored at zero.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        (self.0 - earlier.0).num_milliseconds().max(0) as u64
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creativity_range() {
        assert!(Creativity::new(0.0).is_some());
        assert!(Creativity::new(1.0).is_some());
        assert!(Creativity::new(-0.1).is_none());
        assert!(Creativity::new(1.01).is_none());
        assert!(Creativity::new(f64::NAN).is_none());
    }

    #[test]
    fn test_creativity_hint_thresholds() {
        assert!(Creativity::new(0.2).unwrap().is_factual());
        assert!(!Creativity::new(0.3).unwrap().is_factual());
        assert!(Creativity::new(0.8).unwrap().is_creative());
        assert!(!Creativity::new(0.7).unwrap().is_creative());
    }

    #[test]
    fn test_iteration_count_cap() {
        assert_eq!(IterationCount::new(0).unwrap().get(), 0);
        assert_eq!(IterationCount::new(MAX_ITERATIONS).unwrap().get(), 3);

        let err = IterationCount::new(4).unwrap_err();
        assert_eq!(err.field, "iteration_count");
    }

    #[test]
    fn test_capped_values_are_checked_when_deserialized() {
        assert_eq!(serde_json::from_str::<IterationCount>("3").unwrap().get(), 3);
        assert!(serde_json::from_str::<IterationCount>("4").is_err());
        assert!(serde_json::from_str::<IterationCount>("7").is_err());

        assert_eq!(serde_json::from_str::<Creativity>("0.25").unwrap().as_f64(), 0.25);
        assert!(serde_json::from_str::<Creativity>("1.5").is_err());
        assert!(serde_json::from_str::<Creativity>("-0.1").is_err());
    }

    #[test]
    fn test_image_ref_validation() {
        let image = ImageRef::new("image/png", "iVBORw0KGgo=").unwrap();
        assert_eq!(image.media_type(), "image/png");

        assert!(ImageRef::new("image/tiff", "AAAA").is_err());
        assert!(ImageRef::jpeg("  ").is_err());
    }

    #[test]
    fn test_image_ref_deserializes_with_default_media_type() {
        let image: ImageRef = serde_json::from_str(r#"{"data": "/9j/4AAQ"}"#).unwrap();
        assert_eq!(image.media_type(), "image/jpeg");
        assert_eq!(image.data(), "/9j/4AAQ");

        assert!(serde_json::from_str::<ImageRef>(r#"{"media_type": "text/plain", "data": "x"}"#).is_err());
    }
}
