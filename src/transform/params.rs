use crate::{Result, ThumbCacheError};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Thumbnail fitting mode.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ResizeMode {
    /// Scale and crop to fill the box exactly.
    #[default]
    Outbound,
    /// Scale to fit inside the box, never cropping.
    Inset,
}

impl ResizeMode {
    pub const VALID: [&'static str; 2] = ["outbound", "inset"];

    /// Stable numeric code mixed into the cache key.
    pub fn code(self) -> u32 {
        match self {
            ResizeMode::Inset => 1,
            ResizeMode::Outbound => 2,
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeMode::Outbound => write!(f, "outbound"),
            ResizeMode::Inset => write!(f, "inset"),
        }
    }
}

impl FromStr for ResizeMode {
    type Err = ThumbCacheError;

    /// Tokens are matched exactly; `"Outbound"` is rejected.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outbound" => Ok(ResizeMode::Outbound),
            "inset" => Ok(ResizeMode::Inset),
            _ => Err(ThumbCacheError::InvalidParameter(format!(
                "Invalid mode {:?}, choose one of: {}",
                s,
                Self::VALID.join(", ")
            ))),
        }
    }
}

/// A single resize request against one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    /// Encode quality override (1-100); not part of the cache key.
    pub quality: Option<u8>,
    /// Custom base name for readable artifact names.
    pub file_name: Option<String>,
}

impl TransformSpec {
    pub fn new(width: u32, height: u32, mode: ResizeMode) -> Self {
        Self { width, height, mode, quality: None, file_name: None }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ThumbCacheError::InvalidParameter(format!(
                "Width and height must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                return Err(ThumbCacheError::InvalidParameter(format!(
                    "Quality must be within 1..=100, got {}",
                    q
                )));
            }
        }
        Ok(())
    }

    /// Explicit quality override, else `default`.
    pub fn effective_quality(&self, default: u8) -> u8 {
        self.quality.unwrap_or(default)
    }
}

/// Query parameters accepted by the `/thumb` endpoint.
///
/// `mode` stays a string so that unknown tokens surface as
/// `InvalidParameter` rather than a deserialisation rejection.
#[derive(Debug, Deserialize, Clone)]
pub struct ThumbQuery {
    pub path: String,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub q: Option<u8>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ThumbQuery {
    pub fn to_spec(&self) -> Result<TransformSpec> {
        let mode = match self.mode.as_deref() {
            Some(token) => token.parse()?,
            None => ResizeMode::default(),
        };
        let spec = TransformSpec {
            width: self.w,
            height: self.h,
            mode,
            quality: self.q,
            file_name: self.name.clone().filter(|n| !n.is_empty()),
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl FromStr for ThumbQuery {
    type Err = serde_urlencoded::de::Error;

    /// Parse URL query string into a `ThumbQuery`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_urlencoded::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tokens_are_exact() {
        assert_eq!("outbound".parse::<ResizeMode>().unwrap(), ResizeMode::Outbound);
        assert_eq!("inset".parse::<ResizeMode>().unwrap(), ResizeMode::Inset);

        for bad in ["Outbound", "INSET", "crop", ""] {
            let err = bad.parse::<ResizeMode>().unwrap_err();
            match err {
                ThumbCacheError::InvalidParameter(msg) => assert!(msg.contains("outbound, inset")),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn query_defaults_to_outbound() {
        let q: ThumbQuery = "path=%40frontend%2Fa.jpg&w=50&h=40".parse().unwrap();
        assert_eq!(q.path, "@frontend/a.jpg");
        let spec = q.to_spec().unwrap();
        assert_eq!(spec, TransformSpec::new(50, 40, ResizeMode::Outbound));
    }

    #[test]
    fn query_rejects_zero_dimensions_and_bad_quality() {
        let q: ThumbQuery = "path=a.jpg&w=0&h=40".parse().unwrap();
        assert!(matches!(q.to_spec(), Err(ThumbCacheError::InvalidParameter(_))));

        let q: ThumbQuery = "path=a.jpg&w=10&h=40&q=101".parse().unwrap();
        assert!(matches!(q.to_spec(), Err(ThumbCacheError::InvalidParameter(_))));
    }
}
