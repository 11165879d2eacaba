//! Static property table.
//!
//! The set of properties a core can expose is fixed by the firmware contract:
//! each [`Property`] has a wire name, a characteristic UUID and a value kind.
//! Whether a given core actually exposes a property is only known after
//! endpoint discovery on a live connection.

use core::fmt;
use core::ops::RangeInclusive;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;
use crate::uuid as uuids;
use crate::value::PropertyKind;

/// A named property of a Shiner core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    /// Primary color.
    Color,
    /// Secondary color.
    Color2,
    /// Animation speed.
    Speed,
    /// Animation tau.
    Tau,
    /// Animation phi.
    Phi,
    /// Lights on/off.
    Mode,
    /// Brightness.
    Brightness,
    /// Active layer.
    Layer,
    /// Animation index.
    Animation,
    /// Blend mode name.
    BlendMode,
    /// LED color order.
    LedOrder,
    /// Owner's name.
    Name,
    /// Option lists for enum-like properties.
    Documentation,
}

/// Static identity of a property: wire name, endpoint and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// The property this descriptor belongs to.
    pub property: Property,
    /// Wire name, unique per core.
    pub name: &'static str,
    /// Characteristic UUID the value travels through.
    pub endpoint: Uuid,
    /// Value kind.
    pub kind: PropertyKind,
    /// Whether the app may write this property.
    pub writable: bool,
}

const fn descriptor(
    property: Property,
    name: &'static str,
    endpoint: Uuid,
    kind: PropertyKind,
    writable: bool,
) -> PropertyDescriptor {
    PropertyDescriptor {
        property,
        name,
        endpoint,
        kind,
        writable,
    }
}

/// Descriptor table, indexed by `Property as usize`.
static DESCRIPTORS: [PropertyDescriptor; Property::COUNT] = [
    descriptor(Property::Color, "color", uuids::COLOR, PropertyKind::Color, true),
    descriptor(Property::Color2, "color2", uuids::COLOR2, PropertyKind::Color, true),
    descriptor(Property::Speed, "speed", uuids::SPEED, PropertyKind::Real, true),
    descriptor(Property::Tau, "tau", uuids::TAU, PropertyKind::Real, true),
    descriptor(Property::Phi, "phi", uuids::PHI, PropertyKind::Real, true),
    descriptor(Property::Mode, "mode", uuids::MODE, PropertyKind::Int, true),
    descriptor(Property::Brightness, "brightness", uuids::BRIGHTNESS, PropertyKind::Int, true),
    descriptor(Property::Layer, "layer", uuids::LAYER, PropertyKind::Int, true),
    descriptor(Property::Animation, "animation", uuids::ANIMATION, PropertyKind::Int, true),
    descriptor(Property::BlendMode, "blendMode", uuids::BLEND_MODE, PropertyKind::Text, true),
    descriptor(Property::LedOrder, "ledOrder", uuids::LED_ORDER, PropertyKind::Text, true),
    descriptor(Property::Name, "name", uuids::NAME, PropertyKind::Text, true),
    descriptor(
        Property::Documentation,
        "documentation",
        uuids::DOCUMENTATION,
        PropertyKind::Text,
        false,
    ),
];

/// Which documentation list holds the valid options of an enum-like property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionList {
    /// Animation names, indexed by the `animation` value.
    Animations,
    /// Blend mode names.
    BlendModes,
    /// LED color orders.
    LedColorOrders,
}

impl Property {
    /// Number of properties.
    pub const COUNT: usize = 13;

    /// Every property, in table order.
    pub const ALL: [Property; Property::COUNT] = [
        Property::Color,
        Property::Color2,
        Property::Speed,
        Property::Tau,
        Property::Phi,
        Property::Mode,
        Property::Brightness,
        Property::Layer,
        Property::Animation,
        Property::BlendMode,
        Property::LedOrder,
        Property::Name,
        Property::Documentation,
    ];

    /// Properties whose value belongs to the active layer.
    ///
    /// These must be re-read after the layer changes.
    pub const LAYER_SCOPED: [Property; 7] = [
        Property::Color,
        Property::Color2,
        Property::Speed,
        Property::Tau,
        Property::Phi,
        Property::Animation,
        Property::BlendMode,
    ];

    /// Static descriptor for this property.
    pub fn descriptor(self) -> &'static PropertyDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Wire name.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Characteristic UUID.
    pub fn endpoint(self) -> Uuid {
        self.descriptor().endpoint
    }

    /// Value kind.
    pub fn kind(self) -> PropertyKind {
        self.descriptor().kind
    }

    /// Whether the app may write this property.
    pub fn is_writable(self) -> bool {
        self.descriptor().writable
    }

    /// Look up the property bound to a characteristic UUID.
    pub fn from_endpoint(endpoint: Uuid) -> Option<Property> {
        DESCRIPTORS
            .iter()
            .find(|d| d.endpoint == endpoint)
            .map(|d| d.property)
    }

    /// Whether the value depends on the active layer.
    pub fn is_layer_scoped(self) -> bool {
        Self::LAYER_SCOPED.contains(&self)
    }

    /// The documentation list that enumerates valid values, if enum-like.
    pub fn option_list(self) -> Option<OptionList> {
        match self {
            Property::Animation => Some(OptionList::Animations),
            Property::BlendMode => Some(OptionList::BlendModes),
            Property::LedOrder => Some(OptionList::LedColorOrders),
            _ => None,
        }
    }

    /// Range the firmware accepts for numeric properties.
    ///
    /// Informational; writes are not clamped.
    pub fn range(self) -> Option<RangeInclusive<f64>> {
        match self {
            Property::Speed => Some(0.01..=60.0),
            Property::Tau | Property::Phi => Some(0.01..=80.0),
            Property::Brightness => Some(0.0..=255.0),
            Property::Layer => Some(1.0..=8.0),
            Property::Mode => Some(0.0..=1.0),
            _ => None,
        }
    }

    /// Whether sliders for this property should use a logarithmic scale.
    pub fn is_log_scale(self) -> bool {
        matches!(self, Property::Speed | Property::Tau | Property::Phi)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DESCRIPTORS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.property)
            .ok_or_else(|| ParseError::UnknownProperty(s.to_string()))
    }
}
