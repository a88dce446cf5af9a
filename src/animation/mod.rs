//! In-memory skeleton + animation model.
//!
//! An [`Animation`] owns a dense node list (index == position) and one
//! [`Frame`] per sampled time. Every frame stores a local and a world
//! transform per bone, and after any public operation returns
//! `world = parent.world * local` holds for every bone (`world = local` for
//! roots).

mod hierarchy;
mod mapping;
mod retarget;

use nalgebra::Vector3;

use crate::error::AnimationError;
use crate::transform::{self, Transform};

pub use mapping::{BoneMappingEntry, map_reference_bones};
pub use retarget::{Mode, Space};

// ─── Types ────────────────────────────────────────────────────────────────────

/// A named joint of the skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    /// Position in [`Animation::nodes`] and in every [`Frame::entries`].
    pub index: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Per-frame transforms of one bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEntry {
    pub local_transform: Transform,
    pub world_transform: Transform,
}

impl Default for FrameEntry {
    fn default() -> Self {
        Self {
            local_transform: Transform::identity(),
            world_transform: Transform::identity(),
        }
    }
}

impl FrameEntry {
    /// Entry whose world transform is not yet resolved.
    pub fn from_local(local_transform: Transform) -> Self {
        Self {
            local_transform,
            world_transform: local_transform,
        }
    }
}

/// All bone transforms at one sampled time, indexed by bone index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub entries: Vec<FrameEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub name: String,
    pub nodes: Vec<Node>,
    pub frames: Vec<Frame>,
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

/// Case-insensitive exact-match lookup of a bone name.
pub fn find_node_by_name(nodes: &[Node], name: &str) -> Option<usize> {
    nodes
        .iter()
        .position(|node| node.name.eq_ignore_ascii_case(name))
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        find_node_by_name(&self.nodes, name)
    }

    /// Resolves a bone name, failing with [`AnimationError::BoneNotFound`].
    pub fn bone(&self, name: &str) -> Result<usize, AnimationError> {
        self.find_bone(name)
            .ok_or_else(|| AnimationError::BoneNotFound {
                animation: self.name.clone(),
                bone: name.to_string(),
            })
    }

    pub fn bone_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Indices of every bone without a parent.
    pub fn roots(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.index)
            .collect()
    }

    /// `bone` followed by all of its descendants, parents before children.
    pub fn subtree(&self, bone: usize) -> Vec<usize> {
        subtree_of(&self.nodes, bone)
    }

    pub(crate) fn ensure_frame(&self, frame: usize) -> Result<(), AnimationError> {
        if frame < self.frames.len() {
            Ok(())
        } else {
            Err(AnimationError::FrameOutOfRange {
                animation: self.name.clone(),
                frame,
                count: self.frames.len(),
            })
        }
    }

    /// Fails unless `other` has at least as many frames as `self`.
    pub(crate) fn ensure_frames_cover(&self, other: &Animation) -> Result<(), AnimationError> {
        if other.frames.len() >= self.frames.len() {
            Ok(())
        } else {
            Err(AnimationError::FrameCountMismatch {
                animation: self.name.clone(),
                other: other.name.clone(),
                expected: self.frames.len(),
                actual: other.frames.len(),
            })
        }
    }

    // ─── Read accessors ───────────────────────────────────────────────────────

    pub fn bone_position_in_local_space(&self, bone: usize, frame: usize) -> Vector3<f64> {
        transform::translation(&self.frames[frame].entries[bone].local_transform)
    }

    pub fn bone_position_in_world_space(&self, bone: usize, frame: usize) -> Vector3<f64> {
        transform::translation(&self.frames[frame].entries[bone].world_transform)
    }

    pub fn bone_angles_in_local_space(&self, bone: usize, frame: usize) -> Vector3<f64> {
        transform::euler_angles(&self.frames[frame].entries[bone].local_transform)
    }

    pub fn bone_angles_in_world_space(&self, bone: usize, frame: usize) -> Vector3<f64> {
        transform::euler_angles(&self.frames[frame].entries[bone].world_transform)
    }

    // ─── Propagation ──────────────────────────────────────────────────────────

    /// Recomputes every world transform of every frame from the roots down.
    pub fn build_world_transforms(&mut self) {
        let roots = self.roots();
        for frame in &mut self.frames {
            for &root in &roots {
                world_from_local(&self.nodes, &mut frame.entries, root);
            }
        }
    }

    /// Treats `bone`'s local transform as authoritative in `frame` and
    /// refreshes the world transforms of `bone` and its descendants.
    pub fn update_world_from_local(&mut self, bone: usize, frame: usize) {
        world_from_local(&self.nodes, &mut self.frames[frame].entries, bone);
    }

    /// [`Self::update_world_from_local`] for every frame.
    pub fn update_world_from_local_all_frames(&mut self, bone: usize) {
        for frame in &mut self.frames {
            world_from_local(&self.nodes, &mut frame.entries, bone);
        }
    }

    /// Treats `bone`'s world transform as authoritative in `frame` and
    /// refreshes the local transforms of `bone` and its descendants. The
    /// descendants keep their world pose.
    pub fn update_local_from_world(&mut self, bone: usize, frame: usize) {
        local_from_world(&self.nodes, &mut self.frames[frame].entries, bone);
    }

    /// [`Self::update_local_from_world`] for every frame.
    pub fn update_local_from_world_all_frames(&mut self, bone: usize) {
        for frame in &mut self.frames {
            local_from_world(&self.nodes, &mut frame.entries, bone);
        }
    }

    /// Recomputes only `bone`'s local transform from its world transform,
    /// then pushes the world transforms of its descendants so they follow it.
    pub(crate) fn move_bone_with_subtree(&mut self, bone: usize, frame: usize) {
        let entries = &mut self.frames[frame].entries;
        entries[bone].local_transform = match self.nodes[bone].parent {
            Some(parent) => {
                transform::inverse(&entries[parent].world_transform)
                    * entries[bone].world_transform
            }
            None => entries[bone].world_transform,
        };
        world_from_local(&self.nodes, entries, bone);
    }

    /// Largest absolute difference between any stored world transform and the
    /// one recomposed from local transforms. Zero (up to rounding) whenever
    /// the model is consistent.
    pub fn hierarchy_residual(&self) -> f64 {
        let mut residual = 0.0_f64;
        for frame in &self.frames {
            for node in &self.nodes {
                let entry = &frame.entries[node.index];
                let expected = match node.parent {
                    Some(parent) => frame.entries[parent].world_transform * entry.local_transform,
                    None => entry.local_transform,
                };
                residual = residual.max((expected - entry.world_transform).amax());
            }
        }
        residual
    }
}

// ─── Traversal helpers ────────────────────────────────────────────────────────

pub(crate) fn subtree_of(nodes: &[Node], bone: usize) -> Vec<usize> {
    let mut order = Vec::new();
    let mut stack = vec![bone];
    while let Some(index) = stack.pop() {
        order.push(index);
        stack.extend(nodes[index].children.iter().rev().copied());
    }
    order
}

fn world_from_local(nodes: &[Node], entries: &mut [FrameEntry], bone: usize) {
    for index in subtree_of(nodes, bone) {
        entries[index].world_transform = match nodes[index].parent {
            Some(parent) => entries[parent].world_transform * entries[index].local_transform,
            None => entries[index].local_transform,
        };
    }
}

fn local_from_world(nodes: &[Node], entries: &mut [FrameEntry], bone: usize) {
    for index in subtree_of(nodes, bone) {
        entries[index].local_transform = match nodes[index].parent {
            Some(parent) => {
                transform::inverse(&entries[parent].world_transform)
                    * entries[index].world_transform
            }
            None => entries[index].world_transform,
        };
    }
}

/// Rebuilds every node's `children` list from the `parent` fields.
pub(crate) fn rebuild_children(nodes: &mut [Node]) {
    for node in nodes.iter_mut() {
        node.children.clear();
    }
    for index in 0..nodes.len() {
        if let Some(parent) = nodes[index].parent {
            nodes[parent].children.push(index);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use nalgebra::Vector3;

    use super::{Animation, Frame, FrameEntry, Node, rebuild_children};
    use crate::transform::from_euler_translation;

    /// Builds an animation from `(name, parent, translation, angles)` rows,
    /// with `frames` identical frames, and resolves world transforms.
    pub fn skeleton(
        name: &str,
        bones: &[(&str, Option<usize>, [f64; 3], [f64; 3])],
        frames: usize,
    ) -> Animation {
        let mut nodes: Vec<Node> = bones
            .iter()
            .enumerate()
            .map(|(index, (bone, parent, _, _))| Node {
                name: bone.to_string(),
                index,
                parent: *parent,
                children: Vec::new(),
            })
            .collect();
        rebuild_children(&mut nodes);

        let entries: Vec<FrameEntry> = bones
            .iter()
            .map(|(_, _, t, a)| {
                FrameEntry::from_local(from_euler_translation(
                    &Vector3::new(a[0], a[1], a[2]),
                    &Vector3::new(t[0], t[1], t[2]),
                ))
            })
            .collect();

        let mut animation = Animation {
            name: name.to_string(),
            nodes,
            frames: vec![Frame { entries }; frames],
        };
        animation.build_world_transforms();
        animation
    }

    /// Pelvis -> Spine -> Head, plus two legs ending in feet.
    pub fn biped(name: &str, frames: usize) -> Animation {
        skeleton(
            name,
            &[
                ("Pelvis", None, [0.0, 0.0, 40.0], [0.0, 0.0, 0.0]),
                ("Spine", Some(0), [0.0, 0.0, 10.0], [0.0, 0.0, 0.0]),
                ("Head", Some(1), [0.0, 0.0, 5.0], [0.0, 0.0, 0.0]),
                ("L_Thigh", Some(0), [5.0, 0.0, -2.0], [0.0, 0.3, 0.0]),
                ("L_Foot", Some(3), [0.0, 0.0, -30.0], [0.0, 0.0, 0.0]),
                ("R_Thigh", Some(0), [-5.0, 0.0, -2.0], [0.0, -0.3, 0.0]),
                ("R_Foot", Some(5), [0.0, 0.0, -30.0], [0.0, 0.0, 0.0]),
            ],
            frames,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{biped, skeleton};
    use super::*;

    #[test]
    fn given_mixed_case_name_when_finding_bone_then_lookup_ignores_case() {
        let anim = biped("walk", 1);
        assert_eq!(anim.find_bone("l_foot"), Some(4));
        assert_eq!(anim.find_bone("PELVIS"), Some(0));
        assert!(matches!(
            anim.bone("Tail"),
            Err(AnimationError::BoneNotFound { .. })
        ));
    }

    #[test]
    fn given_chain_when_building_world_transforms_then_translations_accumulate() {
        let anim = skeleton(
            "chain",
            &[
                ("Pelvis", None, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
                ("Spine", Some(0), [0.0, 0.0, 10.0], [0.0, 0.0, 0.0]),
                ("Head", Some(1), [0.0, 0.0, 5.0], [0.0, 0.0, 0.0]),
            ],
            2,
        );

        let head = anim.bone_position_in_world_space(2, 1);
        assert!((head - Vector3::new(0.0, 0.0, 15.0)).norm() < 1e-9);
        assert!(anim.hierarchy_residual() < 1e-9);
    }

    #[test]
    fn given_subtree_when_collecting_then_parents_precede_children() {
        let anim = biped("walk", 1);
        let order = anim.subtree(0);

        assert_eq!(order.len(), anim.bone_count());
        for (position, &bone) in order.iter().enumerate() {
            if let Some(parent) = anim.nodes[bone].parent {
                let parent_position = order.iter().position(|&b| b == parent).unwrap();
                assert!(parent_position < position);
            }
        }
    }

    #[test]
    fn given_edited_local_when_updating_world_then_descendants_follow() {
        let mut anim = biped("walk", 1);
        let head_before = anim.bone_position_in_world_space(2, 0);

        transform::set_translation(
            &mut anim.frames[0].entries[1].local_transform,
            &Vector3::new(0.0, 0.0, 20.0),
        );
        anim.update_world_from_local(1, 0);

        let head_after = anim.bone_position_in_world_space(2, 0);
        assert!((head_after - head_before - Vector3::new(0.0, 0.0, 10.0)).norm() < 1e-9);
        assert!(anim.hierarchy_residual() < 1e-9);
    }

    #[test]
    fn given_edited_world_when_updating_local_then_descendants_stay_in_place() {
        let mut anim = biped("walk", 1);
        let head_before = anim.bone_position_in_world_space(2, 0);

        transform::set_translation(
            &mut anim.frames[0].entries[1].world_transform,
            &Vector3::new(3.0, 0.0, 50.0),
        );
        anim.update_local_from_world(1, 0);

        let head_after = anim.bone_position_in_world_space(2, 0);
        assert!((head_after - head_before).norm() < 1e-9);
        assert!(anim.hierarchy_residual() < 1e-9);
    }
}
