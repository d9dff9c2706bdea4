//! Capacity Resolution
//!
//! Turns a requested capacity range into the single size sent to the remote
//! API. Impossible ranges are not rejected here; the remote API does that.

use crate::domain::ports::CapacityRange;

/// One tebibyte
pub const TIB: u64 = 1 << 40;

/// Smallest instance the standard tier accepts. Premium tiers have a larger
/// minimum which the remote API enforces.
pub const MIN_VOLUME_SIZE_BYTES: u64 = TIB;

/// Resolve the size to provision for `range`, never going below `floor`
/// unless the caller's limit is itself below it.
pub fn resolve_capacity(range: Option<&CapacityRange>, floor: u64) -> u64 {
    let Some(range) = range else {
        return floor;
    };

    let required = range.required_bytes;
    let limit = range.limit_bytes;

    if limit > 0 {
        if required == 0 {
            return limit;
        }
        return required.max(floor).min(limit);
    }

    required.max(floor)
}
