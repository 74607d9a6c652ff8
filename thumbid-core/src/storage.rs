//! Sensor storage reports and slot allocation

use std::collections::BTreeSet;

use thumbid_types::DeviceRecordId;

use crate::constants::CAPACITY;
use crate::error::{Error, Result};

/// Occupied slots as reported by the sensor
///
/// A report is a snapshot. It is only meaningful until the next command
/// that can change occupancy (`ENROLL`, `DELETE_ID`), so it is never cached
/// across such commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReport {
    occupied: BTreeSet<DeviceRecordId>,
}

impl StorageReport {
    pub fn new(occupied: impl IntoIterator<Item = DeviceRecordId>) -> Self {
        Self {
            occupied: occupied.into_iter().collect(),
        }
    }

    pub fn occupied(&self) -> &BTreeSet<DeviceRecordId> {
        &self.occupied
    }

    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    pub fn contains(&self, id: DeviceRecordId) -> bool {
        self.occupied.contains(&id)
    }

    /// Smallest free slot at or below `capacity`
    pub fn next_free_id(&self, capacity: u16) -> Result<DeviceRecordId> {
        compute_next_free_within(&self.occupied, capacity)
    }
}

/// Smallest slot in `1..=CAPACITY` not in `occupied`
///
/// # Errors
///
/// Returns [`Error::StorageFull`] when every slot is taken.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use thumbid_core::compute_next_free;
/// use thumbid_types::DeviceRecordId;
///
/// let occupied: BTreeSet<_> = [1, 2, 3]
///     .into_iter()
///     .map(|v| DeviceRecordId::new(v).unwrap())
///     .collect();
///
/// assert_eq!(compute_next_free(&occupied).unwrap().get(), 4);
/// ```
pub fn compute_next_free(occupied: &BTreeSet<DeviceRecordId>) -> Result<DeviceRecordId> {
    compute_next_free_within(occupied, CAPACITY)
}

/// Same as [`compute_next_free`] for a sensor with fewer slots
///
/// `capacity` is clamped to [`DeviceRecordId::MAX`].
pub fn compute_next_free_within(
    occupied: &BTreeSet<DeviceRecordId>,
    capacity: u16,
) -> Result<DeviceRecordId> {
    let capacity = capacity.min(DeviceRecordId::MAX);
    let full = || Error::StorageFull {
        occupied: occupied.len(),
        capacity,
    };

    if occupied.len() >= usize::from(capacity) {
        return Err(full());
    }

    // Ascending scan so identical snapshots always yield the same slot
    for value in 1..=capacity {
        let id = DeviceRecordId::new(value)?;
        if !occupied.contains(&id) {
            return Ok(id);
        }
    }

    Err(full())
}
