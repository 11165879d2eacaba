//! Typed property values and their wire codecs.
//!
//! Every value travels over the link as UTF-8 text. [`PropertyKind`] is the
//! closed set of kinds a property can have, and each kind carries a pair of
//! pure functions: decode (`&str -> Option<PropertyValue>`) and encode
//! (`PropertyValue -> String`). Decoding never errors; a raw string that does
//! not parse as the declared kind simply has no typed value.
//!
//! Only canonical text decodes: whatever decodes encodes back to the exact
//! same string. `"+5"`, `"007"`, `"1.50"` and `"1  2 3"` have no typed value.
//!
//! | Kind | Wire format | Rust type |
//! |------|-------------|-----------|
//! | Int | base-10 integer, no sign on positives, no leading zeros | `i64` |
//! | Real | shortest decimal, `.` separator, no exponent | `f64` |
//! | Text | anything | `String` |
//! | Color | `"<R> <G> <B>"`, each `0..=255`, single spaces | [`Rgb`] |

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// The kind of a property's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Decimal integer.
    Int,
    /// Decimal real number.
    Real,
    /// Free text.
    Text,
    /// RGB triplet.
    Color,
}

impl PropertyKind {
    /// Every kind.
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::Int,
        PropertyKind::Real,
        PropertyKind::Text,
        PropertyKind::Color,
    ];

    /// Decode a raw wire string into a typed value of this kind.
    ///
    /// Returns `None` if the string does not parse.
    pub fn decode(self, raw: &str) -> Option<PropertyValue> {
        match self {
            PropertyKind::Int => parse_int(raw).map(PropertyValue::Int),
            PropertyKind::Real => parse_real(raw).map(PropertyValue::Real),
            PropertyKind::Text => Some(PropertyValue::Text(raw.to_string())),
            PropertyKind::Color => parse_color(raw).map(PropertyValue::Color),
        }
    }

    /// Human-readable name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::Int => "integer",
            PropertyKind::Real => "real",
            PropertyKind::Text => "text",
            PropertyKind::Color => "color",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Integer value.
    Int(i64),
    /// Real value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Color value.
    Color(Rgb),
}

impl PropertyValue {
    /// The kind of this value.
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Real(_) => PropertyKind::Real,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Color(_) => PropertyKind::Color,
        }
    }

    /// Encode the value into its wire string.
    pub fn encode(&self) -> String {
        match self {
            PropertyValue::Int(v) => format_int(*v),
            PropertyValue::Real(v) => format_real(*v),
            PropertyValue::Text(v) => v.clone(),
            PropertyValue::Color(v) => v.to_string(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// --- Per-kind codecs ---

/// Parse a base-10 integer in canonical form.
pub fn parse_int(raw: &str) -> Option<i64> {
    raw.parse().ok().filter(|v| format_int(*v) == raw)
}

/// Format an integer as a decimal string.
pub fn format_int(value: i64) -> String {
    value.to_string()
}

/// Parse a decimal real, independent of locale.
///
/// Non-finite values are rejected, as is any text [`format_real`] would not
/// produce for the parsed value.
pub fn parse_real(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && format_real(*v) == raw)
}

/// Format a real as the shortest decimal string that parses back to it.
pub fn format_real(value: f64) -> String {
    value.to_string()
}

/// Parse an `"<R> <G> <B>"` color triplet.
pub fn parse_color(raw: &str) -> Option<Rgb> {
    raw.parse().ok()
}

/// An RGB color with 8-bit channels.
///
/// The wire form is three space-separated decimal channels, e.g. `"255 128 0"`.
/// Presentation layers usually work in normalized `[0, 1]` channels; use
/// [`Rgb::from_unit`] and [`Rgb::to_unit`] to convert.
///
/// ```
/// use shiner_types::Rgb;
///
/// let red: Rgb = "255 0 0".parse().unwrap();
/// assert_eq!(red, Rgb::new(255, 0, 0));
/// assert!("256 0 0".parse::<Rgb>().is_err());
/// assert!("10 20".parse::<Rgb>().is_err());
/// assert!("255  0 0".parse::<Rgb>().is_err());
///
/// assert_eq!(Rgb::from_unit(1.0, 0.5, 0.0).to_string(), "255 127 0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    red: u8,
    green: u8,
    blue: u8,
}

impl Rgb {
    /// Black.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Create a color from 8-bit channels.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Create a color from normalized channels.
    ///
    /// Each channel is clamped to `[0, 1]`, scaled by 255 and truncated.
    pub fn from_unit(red: f64, green: f64, blue: f64) -> Self {
        Self::new(unit_to_channel(red), unit_to_channel(green), unit_to_channel(blue))
    }

    /// Normalized `[0, 1]` channels.
    pub fn to_unit(self) -> (f64, f64, f64) {
        (
            f64::from(self.red) / 255.0,
            f64::from(self.green) / 255.0,
            f64::from(self.blue) / 255.0,
        )
    }

    /// Red channel.
    pub fn red(self) -> u8 {
        self.red
    }

    /// Green channel.
    pub fn green(self) -> u8 {
        self.green
    }

    /// Blue channel.
    pub fn blue(self) -> u8 {
        self.blue
    }
}

fn unit_to_channel(value: f64) -> u8 {
    // NaN clamps to NaN, which casts to 0
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

impl FromStr for Rgb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split(' ').collect();
        if tokens.len() != 3 {
            return Err(ParseError::ChannelCount(tokens.len()));
        }

        let mut channels = [0u8; 3];
        for (channel, token) in channels.iter_mut().zip(&tokens) {
            let value = parse_int(token).ok_or_else(|| ParseError::InvalidValue {
                kind: PropertyKind::Color.as_str(),
                raw: s.to_string(),
            })?;
            *channel = u8::try_from(value)
                .map_err(|_| ParseError::ChannelOutOfRange((*token).to_string()))?;
        }

        Ok(Self::new(channels[0], channels[1], channels[2]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.red, self.green, self.blue)
    }
}

/// A Rust type that maps onto one [`PropertyKind`].
///
/// Used by typed accessors such as `Core::typed_value::<f64>(..)`.
pub trait PropertyType: Sized {
    /// The kind this type represents.
    const KIND: PropertyKind;

    /// Extract `Self` from a value of the matching kind.
    fn from_value(value: PropertyValue) -> Option<Self>;

    /// Wrap `self` into a [`PropertyValue`].
    fn into_value(self) -> PropertyValue;
}

impl PropertyType for i64 {
    const KIND: PropertyKind = PropertyKind::Int;

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::Int(self)
    }
}

impl PropertyType for f64 {
    const KIND: PropertyKind = PropertyKind::Real;

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Real(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::Real(self)
    }
}

impl PropertyType for String {
    const KIND: PropertyKind = PropertyKind::Text;

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::Text(self)
    }
}

impl PropertyType for Rgb {
    const KIND: PropertyKind = PropertyKind::Color;

    fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Color(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::Color(self)
    }
}
