//! Transform groups.
//!
//! A transform matrix and any of its position, rotation and scale parts,
//! bound into one dependency group with the matrix as primary. Writing the
//! matrix splits it into the parts; writing a part recomposes the matrix.

use std::fmt;

use super::{DependencyController, DependencyGroup, Participant};
use crate::error::{Result, SlotError};
use crate::slot::{AnySlot, Mat4, Quat, Slot, Vec3};

/// Which value a transform group participant holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformPart {
    Transform,
    Position,
    Rotation,
    Scale,
}

impl fmt::Display for TransformPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transform => "transform",
            Self::Position => "position",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
        };
        f.write_str(name)
    }
}

struct TransformController {
    parts: Vec<TransformPart>,
    transform: Participant<Mat4>,
    position: Option<Participant<Vec3>>,
    rotation: Option<Participant<Quat>>,
    scale: Option<Participant<Vec3>>,
}

impl TransformController {
    /// Write the parts of `matrix` into the part participants. With
    /// `stale_only`, participants holding a valid value are left alone.
    fn split(&self, matrix: &Mat4, stale_only: bool) {
        let (translation, rotation, scale) = matrix.to_trs();
        if let Some(p) = self.position.as_ref().filter(|p| !stale_only || !p.is_valid()) {
            p.assign(translation);
        }
        if let Some(p) = self.rotation.as_ref().filter(|p| !stale_only || !p.is_valid()) {
            p.assign(rotation);
        }
        if let Some(p) = self.scale.as_ref().filter(|p| !stale_only || !p.is_valid()) {
            p.assign(scale);
        }
    }

    /// Rebuild the matrix from the part participants, falling back to the
    /// parts of `current` for participants the group does not have.
    fn compose(&self, current: &Mat4) -> Result<Mat4> {
        let (mut translation, mut rotation, mut scale) = current.to_trs();
        if let Some(p) = &self.position {
            translation = p.peek()?;
        }
        if let Some(p) = &self.rotation {
            rotation = p.peek()?.normalize();
        }
        if let Some(p) = &self.scale {
            scale = p.peek()?;
        }
        Ok(Mat4::from_trs(translation, rotation, scale))
    }
}

impl DependencyController for TransformController {
    fn slot_changed(&self, changed: usize) -> Result<()> {
        let current = self.transform.peek()?;
        match self.parts.get(changed) {
            Some(TransformPart::Transform) => self.split(&current, false),
            Some(TransformPart::Position) => {
                let position = self.position.as_ref().map(Participant::peek).transpose()?;
                if let Some(position) = position {
                    self.transform.assign(current.with_translation(position));
                }
            }
            Some(TransformPart::Rotation | TransformPart::Scale) => {
                self.transform.assign(self.compose(&current)?);
            }
            None => {
                return Err(SlotError::consistency(
                    self.transform.id(),
                    format!("transform group has no participant {changed}"),
                ))
            }
        }
        Ok(())
    }

    fn update_all(&self) -> Result<()> {
        if !self.transform.is_valid() {
            return Err(SlotError::consistency(
                self.transform.id(),
                "transform is stale while its parts are read",
            ));
        }
        let current = self.transform.peek()?;
        self.split(&current, true);
        Ok(())
    }
}

/// A transform matrix bound to its parts.
///
/// # Example
///
/// ```rust
/// use tether_core::interdep::TransformGroup;
/// use tether_core::slot::{Mat4, Slot, Vec3};
///
/// let transform = Slot::new(Mat4::IDENTITY);
/// let position = Slot::new(Vec3::ZERO);
/// let _group = TransformGroup::builder(&transform).position(&position).bind().unwrap();
///
/// position.set(Vec3::new(1.0, 2.0, 3.0)).unwrap();
/// assert_eq!(transform.get().unwrap().translation(), Vec3::new(1.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone)]
pub struct TransformGroup {
    group: DependencyGroup,
    parts: Vec<TransformPart>,
}

impl TransformGroup {
    pub fn builder(transform: &Slot<Mat4>) -> TransformGroupBuilder {
        TransformGroupBuilder {
            label: "transform".to_string(),
            transform: transform.clone(),
            position: None,
            rotation: None,
            scale: None,
        }
    }

    pub fn group(&self) -> &DependencyGroup {
        &self.group
    }

    /// Participants in group index order.
    pub fn parts(&self) -> &[TransformPart] {
        &self.parts
    }
}

/// Builder for [`TransformGroup`]. Any subset of parts may be bound.
#[derive(Debug)]
pub struct TransformGroupBuilder {
    label: String,
    transform: Slot<Mat4>,
    position: Option<Slot<Vec3>>,
    rotation: Option<Slot<Quat>>,
    scale: Option<Slot<Vec3>>,
}

impl TransformGroupBuilder {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn position(mut self, slot: &Slot<Vec3>) -> Self {
        self.position = Some(slot.clone());
        self
    }

    pub fn rotation(mut self, slot: &Slot<Quat>) -> Self {
        self.rotation = Some(slot.clone());
        self
    }

    pub fn scale(mut self, slot: &Slot<Vec3>) -> Self {
        self.scale = Some(slot.clone());
        self
    }

    /// Bind the group. Fails if no part was given.
    pub fn bind(self) -> Result<TransformGroup> {
        let mut parts = vec![TransformPart::Transform];
        let mut slots: Vec<AnySlot> = vec![self.transform.erase()];
        if let Some(slot) = &self.position {
            parts.push(TransformPart::Position);
            slots.push(slot.erase());
        }
        if let Some(slot) = &self.rotation {
            parts.push(TransformPart::Rotation);
            slots.push(slot.erase());
        }
        if let Some(slot) = &self.scale {
            parts.push(TransformPart::Scale);
            slots.push(slot.erase());
        }

        let controller = TransformController {
            parts: parts.clone(),
            transform: Participant::new(&self.transform),
            position: self.position.as_ref().map(Participant::new),
            rotation: self.rotation.as_ref().map(Participant::new),
            scale: self.scale.as_ref().map(Participant::new),
        };
        let group = DependencyGroup::new(self.label, controller, slots)?;
        Ok(TransformGroup { group, parts })
    }
}
