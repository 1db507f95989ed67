//! Queue capability names and queue family resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ash::vk;

use crate::error::{VlkError, VlkResult};

/// The kinds of work a queue family can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueType {
    Unknown,
    Graphics,
    Compute,
    Transfer,
    SparseBinding,
    Protected,
    /// Presentation to a window surface.
    Surface,
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Graphics => "Graphics",
            Self::Compute => "Compute",
            Self::Transfer => "Transfer",
            Self::SparseBinding => "SparseBinding",
            Self::Protected => "Protected",
            Self::Surface => "Surface",
        };
        f.write_str(name)
    }
}

/// Map a single queue flag bit onto a [`QueueType`].
pub fn to_queue_type(flag: vk::QueueFlags) -> QueueType {
    match flag {
        vk::QueueFlags::GRAPHICS => QueueType::Graphics,
        vk::QueueFlags::COMPUTE => QueueType::Compute,
        vk::QueueFlags::TRANSFER => QueueType::Transfer,
        vk::QueueFlags::SPARSE_BINDING => QueueType::SparseBinding,
        vk::QueueFlags::PROTECTED => QueueType::Protected,
        _ => QueueType::Unknown,
    }
}

/// Queue family index selected for each requested queue type.
pub type QueueFamilyMap = BTreeMap<QueueType, u32>;

/// Device queue retrieved for each requested queue type.
pub type QueueMap = BTreeMap<QueueType, vk::Queue>;

/// Pick a queue family for every requested flag (and the surface, if any).
///
/// Families are visited in order and later families overwrite earlier picks
/// until every expected type has been seen at least once.
pub fn build_queue_family_map(
    families: &[vk::QueueFamilyProperties],
    requested: &[vk::QueueFlags],
    has_surface: bool,
    mut surface_support: impl FnMut(u32) -> VlkResult<bool>,
) -> VlkResult<QueueFamilyMap> {
    let mut expected: BTreeSet<QueueType> = requested
        .iter()
        .map(|&flag| to_queue_type(flag))
        .filter(|&queue_type| queue_type != QueueType::Unknown)
        .collect();
    if has_surface {
        expected.insert(QueueType::Surface);
    }

    let mut map = QueueFamilyMap::new();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if has_surface && surface_support(index)? {
            map.insert(QueueType::Surface, index);
        }

        for &flag in requested {
            if family.queue_flags.contains(flag) {
                map.insert(to_queue_type(flag), index);
            }
        }

        if expected.iter().all(|queue_type| map.contains_key(queue_type)) {
            map.remove(&QueueType::Unknown);
            return Ok(map);
        }
    }

    let missing: Vec<String> = expected
        .iter()
        .filter(|queue_type| !map.contains_key(queue_type))
        .map(|queue_type| queue_type.to_string())
        .collect();

    Err(VlkError::FeatureNotSupported(format!(
        "Queue types not supported:\n{}",
        missing.join("\n")
    )))
}

/// The distinct family indices referenced by `map`.
pub fn unique_queue_families(map: &QueueFamilyMap) -> BTreeSet<u32> {
    map.values().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_to_queue_type() {
        assert_eq!(to_queue_type(vk::QueueFlags::GRAPHICS), QueueType::Graphics);
        assert_eq!(to_queue_type(vk::QueueFlags::TRANSFER), QueueType::Transfer);
        assert_eq!(
            to_queue_type(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            QueueType::Unknown
        );
    }

    #[test]
    fn test_single_family_covers_everything() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let map = build_queue_family_map(
            &families,
            &[vk::QueueFlags::GRAPHICS, vk::QueueFlags::COMPUTE],
            true,
            |_| Ok(true),
        )
        .unwrap();

        assert_eq!(map[&QueueType::Graphics], 0);
        assert_eq!(map[&QueueType::Compute], 0);
        assert_eq!(map[&QueueType::Surface], 0);
        assert_eq!(unique_queue_families(&map).len(), 1);
    }

    #[test]
    fn test_search_stops_once_all_types_found() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
        ];
        let map =
            build_queue_family_map(&families, &[vk::QueueFlags::COMPUTE], false, |_| Ok(false))
                .unwrap();
        assert_eq!(map[&QueueType::Compute], 0);
        assert!(!map.contains_key(&QueueType::Surface));
    }

    #[test]
    fn test_surface_on_separate_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let map = build_queue_family_map(&families, &[vk::QueueFlags::GRAPHICS], true, |i| {
            Ok(i == 1)
        })
        .unwrap();
        assert_eq!(map[&QueueType::Graphics], 0);
        assert_eq!(map[&QueueType::Surface], 1);
        assert_eq!(
            unique_queue_families(&map).into_iter().collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_missing_types_are_reported() {
        let families = [family(vk::QueueFlags::TRANSFER)];
        let err = build_queue_family_map(
            &families,
            &[vk::QueueFlags::GRAPHICS, vk::QueueFlags::COMPUTE],
            true,
            |_| Ok(false),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Queue types not supported:"));
        assert!(message.contains("Graphics"));
        assert!(message.contains("Compute"));
        assert!(message.contains("Surface"));
        assert!(!message.contains("Transfer"));
    }
}
