//! Slider-to-target assignment table.

use thiserror::Error;

use super::target::VolumeTarget;

/// Number of sliders on the reference controller.
pub const DEFAULT_SLIDER_COUNT: usize = 5;

/// Error type for assignment table operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignmentError {
    /// The index does not name a physical slider.
    #[error("slider index {index} out of range (controller has {count} sliders)")]
    OutOfRange { index: usize, count: usize },
}

/// Maps each slider index `0..N` to an optional target.
///
/// The table length is fixed at construction; an unassigned slot leaves its
/// slider inert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliderAssignment {
    slots: Vec<Option<VolumeTarget>>,
}

impl SliderAssignment {
    /// Creates a table of `slider_count` unassigned slots.
    pub fn new(slider_count: usize) -> Self {
        Self {
            slots: vec![None; slider_count],
        }
    }

    /// Restores a table from persisted `slider_targets` entries.
    ///
    /// Extra entries are ignored; missing entries stay unassigned.
    pub fn from_settings(entries: &[Option<String>], slider_count: usize) -> Self {
        let mut table = Self::new(slider_count);
        for (slot, entry) in table.slots.iter_mut().zip(entries) {
            *slot = entry.as_deref().and_then(VolumeTarget::from_setting);
        }
        table
    }

    /// Encodes the table as `slider_targets` entries.
    pub fn to_settings(&self) -> Vec<Option<String>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(VolumeTarget::to_setting))
            .collect()
    }

    /// Number of sliders in the table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when the table has no sliders at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the target of `index`, `Ok(None)` when unassigned.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::OutOfRange`] for an index past the table.
    pub fn get(&self, index: usize) -> Result<Option<&VolumeTarget>, AssignmentError> {
        self.slots
            .get(index)
            .map(Option::as_ref)
            .ok_or(AssignmentError::OutOfRange {
                index,
                count: self.slots.len(),
            })
    }

    /// Replaces the target of `index` and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError::OutOfRange`] for an index past the table.
    pub fn set(
        &mut self,
        index: usize,
        target: Option<VolumeTarget>,
    ) -> Result<Option<VolumeTarget>, AssignmentError> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AssignmentError::OutOfRange { index, count })?;
        Ok(std::mem::replace(slot, target))
    }

    /// Iterates over `(index, target)` for assigned slots only.
    pub fn assigned(&self) -> impl Iterator<Item = (usize, &VolumeTarget)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|t| (i, t)))
    }
}

impl Default for SliderAssignment {
    fn default() -> Self {
        Self::new(DEFAULT_SLIDER_COUNT)
    }
}
