//! Platform-agnostic types for Shiner lighting cores.
//!
//! This crate holds everything about a core's properties that does not
//! depend on a Bluetooth stack, so it can be shared by the sync engine
//! (shiner-core) and by presentation code.
//!
//! # Features
//!
//! - UUID constants for the Shiner service and its characteristics
//! - The static property table ([`Property`], [`PropertyDescriptor`])
//! - Wire codecs for the four value kinds ([`PropertyKind`], [`PropertyValue`], [`Rgb`])
//! - The documentation option-list model ([`Documentation`])
//!
//! # Example
//!
//! ```
//! use shiner_types::{Property, PropertyValue, Rgb};
//!
//! let kind = Property::Color.kind();
//! assert_eq!(kind.decode("255 0 0"), Some(PropertyValue::Color(Rgb::new(255, 0, 0))));
//! assert_eq!(Property::Speed.kind().decode("fast"), None);
//! ```

pub mod documentation;
pub mod error;
pub mod property;
pub mod uuid;
pub mod value;

pub use documentation::Documentation;
pub use error::{ParseError, ParseResult};
pub use property::{OptionList, Property, PropertyDescriptor};
pub use uuid as uuids;
pub use value::{PropertyKind, PropertyType, PropertyValue, Rgb};
