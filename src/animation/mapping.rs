use super::{Animation, find_node_by_name};

/// An explicit `(reference bone, target bone)` name pair consulted after the
/// direct name match.
pub type BoneMappingEntry = (String, String);

/// Maps every bone of `reference` to a bone of `target`.
///
/// Bones are first matched by case-insensitive name. Each override pair then
/// replaces the match of its reference bone when both names resolve.
///
/// # Returns
///
/// One slot per reference bone index, `None` when the bone has no
/// counterpart in `target`.
pub fn map_reference_bones(
    reference: &Animation,
    target: &Animation,
    overrides: &[BoneMappingEntry],
) -> Vec<Option<usize>> {
    let mut mapped: Vec<Option<usize>> = reference
        .nodes
        .iter()
        .map(|node| {
            let found = target.find_bone(&node.name);
            if found.is_none() {
                tracing::debug!(
                    "'{}' has no bone {}, reference pose is kept",
                    target.name,
                    node.name
                );
            }
            found
        })
        .collect();

    for (reference_name, target_name) in overrides {
        let Some(reference_index) = find_node_by_name(&reference.nodes, reference_name) else {
            tracing::debug!(
                "'{}' has no bone {}, mapping ignored",
                reference.name,
                reference_name
            );
            continue;
        };

        match target.find_bone(target_name) {
            Some(target_index) => {
                tracing::debug!("bone mapping {} => {}", reference_name, target_name);
                mapped[reference_index] = Some(target_index);
            }
            None => {
                tracing::debug!(
                    "'{}' has no bone {}, mapping ignored",
                    target.name,
                    target_name
                );
            }
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{biped, skeleton};
    use super::*;

    #[test]
    fn given_same_names_when_mapping_then_bones_match_case_insensitively() {
        let reference = biped("reference", 1);
        let target = skeleton(
            "target",
            &[
                ("pelvis", None, [0.0; 3], [0.0; 3]),
                ("HEAD", Some(0), [0.0, 0.0, 1.0], [0.0; 3]),
            ],
            1,
        );

        let mapped = map_reference_bones(&reference, &target, &[]);

        assert_eq!(mapped.len(), reference.bone_count());
        assert_eq!(mapped[0], Some(0));
        assert_eq!(mapped[1], None);
        assert_eq!(mapped[2], Some(1));
    }

    #[test]
    fn given_override_when_mapping_then_override_wins() {
        let reference = biped("reference", 1);
        let target = skeleton(
            "target",
            &[
                ("Pelvis", None, [0.0; 3], [0.0; 3]),
                ("Spine1", Some(0), [0.0, 0.0, 1.0], [0.0; 3]),
                ("Spine", Some(1), [0.0, 0.0, 1.0], [0.0; 3]),
            ],
            1,
        );

        let overrides = vec![
            ("Spine".to_string(), "Spine1".to_string()),
            ("Tail".to_string(), "Spine".to_string()),
            ("Head".to_string(), "Missing".to_string()),
        ];
        let mapped = map_reference_bones(&reference, &target, &overrides);

        assert_eq!(mapped[1], Some(1));
        assert_eq!(mapped[2], None);
    }
}
