// SPDX-License-Identifier: GPL-3.0-only

//! Sector geometry resolver
//!
//! Converts a pair of size expressions into an absolute, inclusive sector
//! range on a concrete device. Pure and deterministic; alignment is the
//! provider's concern, not ours.

use crate::error::GeometryError;
use crate::size::{SizeAnchor, SizeSpec, SizeUnit};

/// Physical extent of a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    pub total_sectors: u64,
    pub sector_size: u64,
}

/// An inclusive sector range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    pub start: u64,
    pub end: u64,
}

impl SectorRange {
    pub fn sectors(&self) -> u64 {
        self.end - self.start + 1
    }
}

fn to_sectors(spec: &SizeSpec, geometry: &DiskGeometry) -> Result<u64, GeometryError> {
    match spec.unit {
        SizeUnit::Percent => {
            if spec.magnitude == 0 {
                return Err(GeometryError::ZeroPercent);
            }
            // Historical behavior: divide by the percentage number.
            Ok(geometry.total_sectors / spec.magnitude)
        }
        SizeUnit::Bytes(multiplier) => spec
            .magnitude
            .checked_mul(multiplier)
            .map(|bytes| bytes / geometry.sector_size)
            // A byte count past u64 cannot land on any device; report the
            // largest representable sector.
            .ok_or(GeometryError::OutOfBounds {
                sector: u64::MAX,
                total: geometry.total_sectors,
            }),
        SizeUnit::Sectors => Ok(spec.magnitude),
    }
}

/// Resolve a `(start, stop)` expression pair against a device.
///
/// `cursor` is the first sector this field may occupy when the start
/// expression is cursor-anchored: the previous partition's end + 1, or the
/// table's first usable sector for the first partition.
pub fn resolve_range(
    start: &SizeSpec,
    stop: &SizeSpec,
    cursor: u64,
    geometry: &DiskGeometry,
) -> Result<SectorRange, GeometryError> {
    let total = geometry.total_sectors;
    let out_of_bounds = |sector: u64| GeometryError::OutOfBounds { sector, total };

    let start_sectors = to_sectors(start, geometry)?;
    let resolved_start = match start.anchor {
        SizeAnchor::Begin => start_sectors,
        SizeAnchor::End => total
            .checked_sub(start_sectors)
            .ok_or_else(|| out_of_bounds(start_sectors))?,
        SizeAnchor::Cursor => start_sectors
            .checked_add(cursor)
            .ok_or_else(|| out_of_bounds(u64::MAX))?,
    };

    let stop_sectors = to_sectors(stop, geometry)?;
    let resolved_end = match stop.anchor {
        SizeAnchor::Begin => stop_sectors,
        SizeAnchor::End => total
            .checked_sub(1 + stop_sectors)
            .ok_or_else(|| out_of_bounds(stop_sectors))?,
        SizeAnchor::Cursor => resolved_start
            .checked_add(stop_sectors)
            .ok_or_else(|| out_of_bounds(u64::MAX))?,
    };

    if resolved_start > resolved_end {
        return Err(GeometryError::Inverted {
            start: resolved_start,
            end: resolved_end,
        });
    }
    if resolved_end > total - 1 {
        return Err(out_of_bounds(resolved_end));
    }

    Ok(SectorRange {
        start: resolved_start,
        end: resolved_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOMETRY: DiskGeometry = DiskGeometry {
        total_sectors: 1_048_576,
        sector_size: 512,
    };

    fn spec(s: &str) -> SizeSpec {
        s.parse().expect("valid spec")
    }

    #[test]
    fn absolute_begin_range() {
        let range = resolve_range(&spec("+0"), &spec("+2048"), 0, &GEOMETRY).expect("range");
        assert_eq!(range, SectorRange { start: 0, end: 2048 });
    }

    #[test]
    fn byte_suffix_converts_through_sector_size() {
        // 1 MiB at 512-byte sectors is 2048 sectors.
        let range = resolve_range(&spec("2048"), &spec("1M"), 0, &GEOMETRY).expect("range");
        assert_eq!(range.start, 2048);
        assert_eq!(range.end, 2048 + 2048);
    }

    #[test]
    fn cursor_start_chains_from_previous_end() {
        let first = resolve_range(&spec("+0"), &spec("4095"), 2048, &GEOMETRY).expect("first");
        let second =
            resolve_range(&spec("0"), &spec("-0"), first.end + 1, &GEOMETRY).expect("second");
        assert_eq!(second.start, first.end + 1);
        assert_eq!(second.end, GEOMETRY.total_sectors - 1);
    }

    #[test]
    fn end_anchored_stop_leaves_tail_free() {
        // Keep 1 GiB (2097152 sectors) free at the end of the device.
        let geometry = DiskGeometry {
            total_sectors: 8_388_608,
            sector_size: 512,
        };
        let range = resolve_range(&spec("+2048"), &spec("-1G"), 0, &geometry).expect("range");
        assert_eq!(range.end, 8_388_608 - 1 - 2_097_152);
    }

    #[test]
    fn percent_divides_device_length() {
        // Historical semantics: "50%" of the device is total / 50.
        let geometry = DiskGeometry {
            total_sectors: 1000,
            sector_size: 512,
        };
        let range = resolve_range(&spec("+0"), &spec("50%"), 0, &geometry).expect("range");
        assert_eq!(range.end, 1000 / 50);
    }

    #[test]
    fn inverted_range_rejected() {
        let err = resolve_range(&spec("+4096"), &spec("+2048"), 0, &GEOMETRY).unwrap_err();
        assert!(matches!(err, GeometryError::Inverted { .. }));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let err = resolve_range(&spec("+0"), &spec("+1048576"), 0, &GEOMETRY).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { .. }));
    }

    #[test]
    fn overflowing_byte_product_is_out_of_bounds() {
        // 2^24 TiB is 2^64 bytes, one past what u64 can hold.
        let err = resolve_range(&spec("+0"), &spec("+16777216T"), 0, &GEOMETRY).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { .. }));
    }

    #[test]
    fn overflowing_cursor_addition_is_out_of_bounds() {
        let max_sectors = u64::MAX.to_string();
        let err = resolve_range(&spec(&max_sectors), &spec("-0"), 2048, &GEOMETRY).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { .. }));

        let err = resolve_range(&spec("+2048"), &spec(&max_sectors), 0, &GEOMETRY).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { .. }));
    }
}
