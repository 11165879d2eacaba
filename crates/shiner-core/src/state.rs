//! Synchronized state of one property.

use serde::{Deserialize, Serialize};

use shiner_types::{Property, PropertyDescriptor, PropertyKind, PropertyType, PropertyValue};

use crate::transport::EndpointInfo;

/// Mutable state of one property of one core.
///
/// `raw` is the only stored value; typed values are decoded from it on each
/// access. A property is available only while it has an endpoint binding on
/// the current connection.
#[derive(Debug, Clone)]
pub struct PropertyState {
    descriptor: &'static PropertyDescriptor,
    raw: Option<String>,
    binding: Option<EndpointInfo>,
    pending_write: bool,
}

impl PropertyState {
    /// Fresh, unbound state for a property.
    pub fn new(property: Property) -> Self {
        Self {
            descriptor: property.descriptor(),
            raw: None,
            binding: None,
            pending_write: false,
        }
    }

    /// The property.
    pub fn property(&self) -> Property {
        self.descriptor.property
    }

    /// Static descriptor.
    pub fn descriptor(&self) -> &'static PropertyDescriptor {
        self.descriptor
    }

    /// Value kind.
    pub fn kind(&self) -> PropertyKind {
        self.descriptor.kind
    }

    /// Last raw value received or written.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Endpoint binding on the current connection.
    pub fn binding(&self) -> Option<&EndpointInfo> {
        self.binding.as_ref()
    }

    /// Whether the property is bound on the current connection.
    pub fn is_available(&self) -> bool {
        self.binding.is_some()
    }

    /// Whether the bound endpoint can be read.
    pub fn is_readable(&self) -> bool {
        self.binding.is_some_and(|b| b.readable)
    }

    /// Whether a throttled write is scheduled or running.
    pub fn pending_write(&self) -> bool {
        self.pending_write
    }

    /// Decoded value, or `None` when absent or malformed.
    pub fn value(&self) -> Option<PropertyValue> {
        self.raw.as_deref().and_then(|raw| self.kind().decode(raw))
    }

    /// Decoded value as a concrete Rust type.
    ///
    /// Returns `None` if `T` does not match the property's kind.
    pub fn typed<T: PropertyType>(&self) -> Option<T> {
        if T::KIND != self.kind() {
            return None;
        }
        self.value().and_then(T::from_value)
    }

    /// Store a raw value. Returns whether it differs from the previous one.
    pub(crate) fn set_raw(&mut self, raw: String) -> bool {
        if self.raw.as_deref() == Some(raw.as_str()) {
            return false;
        }
        self.raw = Some(raw);
        true
    }

    /// Bind to an endpoint. Returns whether availability changed.
    pub(crate) fn bind(&mut self, endpoint: EndpointInfo) -> bool {
        let was_available = self.is_available();
        self.binding = Some(endpoint);
        !was_available
    }

    /// Drop the binding. Returns whether availability changed.
    pub(crate) fn unbind(&mut self) -> bool {
        self.pending_write = false;
        self.binding.take().is_some()
    }

    pub(crate) fn set_pending_write(&mut self, pending: bool) {
        self.pending_write = pending;
    }

    /// Forget everything learned on a previous connection.
    pub(crate) fn reset(&mut self) {
        self.raw = None;
        self.binding = None;
        self.pending_write = false;
    }

    /// Owned copy for observers.
    pub fn snapshot(&self) -> PropertySnapshot {
        PropertySnapshot {
            property: self.property(),
            available: self.is_available(),
            raw: self.raw.clone(),
            value: self.value(),
            pending_write: self.pending_write,
        }
    }
}

/// Point-in-time view of a property, for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    /// The property.
    pub property: Property,
    /// Whether the property is bound on the current connection.
    pub available: bool,
    /// Raw wire value.
    pub raw: Option<String>,
    /// Decoded value.
    pub value: Option<PropertyValue>,
    /// Whether a throttled write is outstanding.
    pub pending_write: bool,
}
