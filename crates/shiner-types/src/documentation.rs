//! Option lists published by the `documentation` endpoint.
//!
//! Some firmware revisions expose a read-only endpoint describing the valid
//! values of enum-like properties. The payload is a JSON object; every list is
//! optional, and a missing or empty list means "no known options".
//!
//! ```
//! use shiner_types::{Documentation, OptionList};
//!
//! let doc = Documentation::parse(r#"{"animations": ["Rainbow", "Pulse"]}"#).unwrap();
//! assert_eq!(doc.options(OptionList::Animations), ["Rainbow", "Pulse"]);
//! assert!(doc.options(OptionList::BlendModes).is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::property::OptionList;

/// Valid option strings for enum-like properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Documentation {
    /// Animation names; the `animation` property is an index into this list.
    pub animations: Vec<String>,
    /// Blend mode names.
    pub blend_modes: Vec<String>,
    /// LED color orders, e.g. `"RGB"`, `"GRB"`.
    pub led_color_orders: Vec<String>,
}

impl Documentation {
    /// Parse the raw documentation payload.
    pub fn parse(raw: &str) -> ParseResult<Self> {
        serde_json::from_str(raw).map_err(|e| ParseError::InvalidDocumentation(e.to_string()))
    }

    /// The options of one list. Empty when the firmware did not publish it.
    pub fn options(&self, list: OptionList) -> &[String] {
        match list {
            OptionList::Animations => &self.animations,
            OptionList::BlendModes => &self.blend_modes,
            OptionList::LedColorOrders => &self.led_color_orders,
        }
    }

    /// Name of the animation at `index`.
    pub fn animation_name(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.animations.get(i))
            .map(String::as_str)
    }

    /// Index of an animation by name.
    pub fn animation_index(&self, name: &str) -> Option<i64> {
        self.animations
            .iter()
            .position(|a| a == name)
            .and_then(|i| i64::try_from(i).ok())
    }
}
