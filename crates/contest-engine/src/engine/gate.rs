//! Eligibility gate.

use crate::model::CurrentOrder;

/// Whether `current` has enough data to generate and submit a rebuttal.
///
/// Requires the appeal handle, the claim reason and the item summary. The
/// evidence image is optional.
pub fn should_generate_defense(current: &CurrentOrder) -> bool {
    current.appeal_handle.is_some() && current.reason.is_some() && current.items.is_some()
}
