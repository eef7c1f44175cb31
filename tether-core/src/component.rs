//! Components
//!
//! A component is a named table of slots. Slot names iterate in insertion
//! order. A component may delegate lookups to another component (a scene
//! object to its geometry, say): [`Component::lookup`] checks its own slots
//! first, then the delegate's.
//!
//! Components with a fixed set of slots are usually declared with
//! [`declare_slots!`](crate::declare_slots), which generates a typed
//! accessor for every slot and registers all of them by name.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Result, SlotError};
use crate::slot::{AnySlot, Slot, SlotValue};

/// A named collection of slots.
pub struct Component {
    name: String,
    slots: IndexMap<String, AnySlot>,
    delegate: Option<Arc<Component>>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: IndexMap::new(),
            delegate: None,
        }
    }

    /// Forward lookups that miss this component to `delegate`.
    pub fn with_delegate(mut self, delegate: Arc<Component>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delegate(&self) -> Option<&Arc<Component>> {
        self.delegate.as_ref()
    }

    /// Register `slot` under `name`.
    pub fn add_slot(&mut self, name: impl Into<String>, slot: impl Into<AnySlot>) -> Result<()> {
        let name = name.into();
        if self.slots.contains_key(&name) {
            return Err(SlotError::DuplicateSlot { name });
        }
        let slot = slot.into();
        debug!(component = %self.name, name = %name, slot = %slot.id(), "slot added");
        self.slots.insert(name, slot);
        Ok(())
    }

    #[doc(hidden)]
    pub fn insert_declared(&mut self, name: &str, slot: AnySlot) {
        self.slots.insert(name.to_string(), slot);
    }

    /// The slot registered under `name` in this component.
    pub fn slot(&self, name: &str) -> Result<AnySlot> {
        self.slots.get(name).cloned().ok_or_else(|| SlotError::UnknownSlot {
            name: name.to_string(),
        })
    }

    /// Typed version of [`slot`](Self::slot).
    pub fn slot_as<T: SlotValue>(&self, name: &str) -> Result<Slot<T>> {
        self.slot(name)?.downcast()
    }

    /// Look `name` up here, then in the delegate chain.
    pub fn lookup(&self, name: &str) -> Result<AnySlot> {
        match (self.slots.get(name), &self.delegate) {
            (Some(slot), _) => Ok(slot.clone()),
            (None, Some(delegate)) => delegate.lookup(name),
            (None, None) => Err(SlotError::UnknownSlot {
                name: name.to_string(),
            }),
        }
    }

    pub fn lookup_as<T: SlotValue>(&self, name: &str) -> Result<Slot<T>> {
        self.lookup(name)?.downcast()
    }

    /// Slot names and handles, in insertion order.
    pub fn iter_slots(&self) -> impl Iterator<Item = (&str, &AnySlot)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), slot))
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Unregister a slot. The slot itself lives on while other handles
    /// exist.
    pub fn remove_slot(&mut self, name: &str) -> Option<AnySlot> {
        self.slots.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("delegate", &self.delegate.as_ref().map(|d| d.name()))
            .finish()
    }
}

/// Declare a component type with typed slots.
///
/// Every field becomes a `Slot<T>` with the given initial value, a typed
/// accessor of the same name, and an entry in the component's name table.
///
/// ```rust
/// use tether_core::declare_slots;
/// use tether_core::slot::Vec3;
///
/// declare_slots! {
///     pub struct Light {
///         intensity: f64 = 1.0,
///         color: Vec3 = Vec3::ONE,
///     }
/// }
///
/// let light = Light::new("key");
/// light.intensity().set(2.0).unwrap();
/// let by_name = light.component().slot_as::<f64>("intensity").unwrap();
/// assert_eq!(by_name.get().unwrap(), 2.0);
/// ```
#[macro_export]
macro_rules! declare_slots {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($field:ident : $ty:ty = $init:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            component: $crate::component::Component,
            $($field: $crate::slot::Slot<$ty>,)*
        }

        impl $name {
            /// Create the component with every slot at its initial value.
            pub fn new(name: impl Into<String>) -> Self {
                let mut component = $crate::component::Component::new(name);
                $(
                    let $field = $crate::slot::Slot::<$ty>::new($init);
                    component.insert_declared(stringify!($field), $field.erase());
                )*
                Self {
                    component,
                    $($field,)*
                }
            }

            $(
                pub fn $field(&self) -> &$crate::slot::Slot<$ty> {
                    &self.$field
                }
            )*

            pub fn component(&self) -> &$crate::component::Component {
                &self.component
            }
        }
    };
}
