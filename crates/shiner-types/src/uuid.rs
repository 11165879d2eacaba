//! Bluetooth UUIDs for Shiner cores.
//!
//! Every core exposes one custom service. Each property lives on its own
//! characteristic inside that service, and the assignment is fixed across
//! firmware and app versions. All characteristic UUIDs share the service's
//! base and differ only in the first group.

use uuid::{Uuid, uuid};

// --- Service ---

/// Custom Shiner service UUID. Scans are filtered on this UUID.
pub const SHINER_SERVICE: Uuid = uuid!("6c0de004-629d-4717-bed5-847fddfbdc2e");

// --- Property characteristics ---

/// Primary color, `"<R> <G> <B>"`.
pub const COLOR: Uuid = uuid!("6c0de101-629d-4717-bed5-847fddfbdc2e");

/// Secondary color, `"<R> <G> <B>"`.
pub const COLOR2: Uuid = uuid!("6c0de102-629d-4717-bed5-847fddfbdc2e");

/// Animation speed (decimal real).
pub const SPEED: Uuid = uuid!("6c0de103-629d-4717-bed5-847fddfbdc2e");

/// Animation tau parameter (decimal real).
pub const TAU: Uuid = uuid!("6c0de104-629d-4717-bed5-847fddfbdc2e");

/// Animation phi parameter (decimal real).
pub const PHI: Uuid = uuid!("6c0de105-629d-4717-bed5-847fddfbdc2e");

/// Light mode, 0 = off (decimal integer).
pub const MODE: Uuid = uuid!("6c0de106-629d-4717-bed5-847fddfbdc2e");

/// Brightness 0-255 (decimal integer).
pub const BRIGHTNESS: Uuid = uuid!("6c0de107-629d-4717-bed5-847fddfbdc2e");

/// Active layer (decimal integer).
pub const LAYER: Uuid = uuid!("6c0de108-629d-4717-bed5-847fddfbdc2e");

/// Animation index (decimal integer).
pub const ANIMATION: Uuid = uuid!("6c0de109-629d-4717-bed5-847fddfbdc2e");

/// Blend mode name (free text).
pub const BLEND_MODE: Uuid = uuid!("6c0de10a-629d-4717-bed5-847fddfbdc2e");

/// LED color order, e.g. `"GRB"` (free text).
pub const LED_ORDER: Uuid = uuid!("6c0de10b-629d-4717-bed5-847fddfbdc2e");

/// Owner's name (free text).
pub const NAME: Uuid = uuid!("6c0de10c-629d-4717-bed5-847fddfbdc2e");

/// Option lists for enum-like properties (JSON, read-only).
pub const DOCUMENTATION: Uuid = uuid!("6c0de10d-629d-4717-bed5-847fddfbdc2e");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuid() {
        assert_eq!(
            SHINER_SERVICE.to_string(),
            "6c0de004-629d-4717-bed5-847fddfbdc2e"
        );
    }

    #[test]
    fn test_characteristics_share_service_base() {
        let base = &SHINER_SERVICE.to_string()[8..];
        for uuid in [
            COLOR,
            COLOR2,
            SPEED,
            TAU,
            PHI,
            MODE,
            BRIGHTNESS,
            LAYER,
            ANIMATION,
            BLEND_MODE,
            LED_ORDER,
            NAME,
            DOCUMENTATION,
        ] {
            assert_eq!(&uuid.to_string()[8..], base);
            assert_ne!(uuid, SHINER_SERVICE);
        }
    }
}
