//! Retargeting operations: per-bone rotate/translate edits, bone-length
//! normalization, foot solving and cross-animation pose copies.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{Animation, BoneMappingEntry, map_reference_bones};
use crate::error::AnimationError;
use crate::transform::{self, Transform};

/// Space an edit is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Space {
    /// Relative to the bone's parent.
    #[default]
    Local,
    /// Relative to the animation's root coordinate frame.
    World,
}

/// Which axes an edit is measured along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The fixed axes of the chosen [`Space`].
    Absolute,
    /// The bone's own current axes.
    #[default]
    Relative,
}

impl Animation {
    // ─── Rotate / translate ───────────────────────────────────────────────────

    /// Rotates `bone` by the Euler delta `angles` in every frame, keeping the
    /// bone's position.
    ///
    /// Local-space edits carry the subtree along. World-space edits refresh
    /// local transforms so descendants keep their world pose.
    pub fn rotate_bone(&mut self, bone: usize, angles: &Vector3<f64>, space: Space, mode: Mode) {
        let parent = self.nodes[bone].parent;
        let rotate = |m: &Transform| match mode {
            Mode::Relative => transform::rotate_about_own_axes(m, angles),
            Mode::Absolute => transform::rotate_about_fixed_axes(m, angles),
        };

        for frame in 0..self.frames.len() {
            let entries = &mut self.frames[frame].entries;
            match space {
                Space::Local => {
                    entries[bone].local_transform = rotate(&entries[bone].local_transform);
                    self.update_world_from_local(bone, frame);
                }
                Space::World => {
                    let parent_world = parent.map(|p| entries[p].world_transform);
                    entries[bone].world_transform = match (mode, parent_world) {
                        (Mode::Relative, Some(parent_world)) => {
                            let local = transform::inverse(&parent_world)
                                * entries[bone].world_transform;
                            parent_world * rotate(&local)
                        }
                        _ => rotate(&entries[bone].world_transform),
                    };
                    self.update_local_from_world(bone, frame);
                }
            }
        }
    }

    /// Moves `bone` by `delta` in every frame.
    ///
    /// In [`Mode::Absolute`] the delta is added to the translation of the
    /// chosen space; in [`Mode::Relative`] it is projected onto the bone's
    /// own basis vectors ("forward/right/up" from the bone's orientation).
    pub fn translate_bone(&mut self, bone: usize, delta: &Vector3<f64>, space: Space, mode: Mode) {
        let shift = |m: &Transform| -> Vector3<f64> {
            match mode {
                Mode::Absolute => *delta,
                Mode::Relative => (0..3).map(|axis| transform::basis(m, axis) * delta[axis]).sum(),
            }
        };

        for frame in 0..self.frames.len() {
            let entry = &mut self.frames[frame].entries[bone];
            match space {
                Space::Local => {
                    let moved = transform::translation(&entry.local_transform)
                        + shift(&entry.local_transform);
                    transform::set_translation(&mut entry.local_transform, &moved);
                    self.update_world_from_local(bone, frame);
                }
                Space::World => {
                    let moved = transform::translation(&entry.world_transform)
                        + shift(&entry.world_transform);
                    transform::set_translation(&mut entry.world_transform, &moved);
                    self.update_local_from_world(bone, frame);
                }
            }
        }
    }

    // ─── Bone lengths ─────────────────────────────────────────────────────────

    /// Rescales every mapped bone's local offset so its length matches the
    /// bone-to-parent distance of `reference` (measured in its first frame).
    ///
    /// Bones are matched by name, then by `overrides`. Roots on either side
    /// and bones sitting exactly on their parent are left untouched.
    pub fn fixup_bone_lengths(
        &mut self,
        reference: &Animation,
        overrides: &[BoneMappingEntry],
    ) -> Result<(), AnimationError> {
        let Some(reference_frame) = reference.frames.first() else {
            return Err(AnimationError::NoFrames {
                animation: reference.name.clone(),
            });
        };

        let mapped = map_reference_bones(reference, self, overrides);

        let targets: Vec<(usize, f64)> = reference
            .nodes
            .iter()
            .filter_map(|node| {
                let parent = node.parent?;
                let target = mapped[node.index]?;
                self.nodes[target].parent?;

                let bone_position =
                    transform::translation(&reference_frame.entries[node.index].world_transform);
                let parent_position =
                    transform::translation(&reference_frame.entries[parent].world_transform);
                Some((target, (bone_position - parent_position).norm()))
            })
            .collect();

        tracing::debug!(
            "{}: normalizing {} bone lengths against '{}'",
            self.name,
            targets.len(),
            reference.name
        );

        let roots = self.roots();
        for frame in &mut self.frames {
            for &(bone, length) in &targets {
                let local = &mut frame.entries[bone].local_transform;
                let offset = transform::translation(local);
                if offset.norm() > 0.0 {
                    transform::set_translation(local, &(offset.normalize() * length));
                }
            }
        }
        for root in roots {
            self.update_world_from_local_all_frames(root);
        }

        Ok(())
    }

    // ─── Foot solving ─────────────────────────────────────────────────────────

    /// Moves the pelvis in world space so the feet land where they are in
    /// `original`.
    ///
    /// Per frame the pelvis first shifts so the left foot matches exactly,
    /// then shifts again by half of the remaining right-foot mismatch. This is
    /// a compromise between the two feet, not an exact two-target solve. Both
    /// animations are expected to share frame count and timing.
    pub fn solve_foots(
        &mut self,
        left_foot: &str,
        right_foot: &str,
        pelvis: &str,
        original: &Animation,
        original_left_foot: &str,
        original_right_foot: &str,
    ) -> Result<(), AnimationError> {
        let left_foot = self.bone(left_foot)?;
        let right_foot = self.bone(right_foot)?;
        let pelvis = self.bone(pelvis)?;
        let original_left_foot = original.bone(original_left_foot)?;
        let original_right_foot = original.bone(original_right_foot)?;
        self.ensure_frames_cover(original)?;

        for frame in 0..self.frames.len() {
            let target_left = original.bone_position_in_world_space(original_left_foot, frame);
            let target_right = original.bone_position_in_world_space(original_right_foot, frame);

            let left_delta = target_left - self.bone_position_in_world_space(left_foot, frame);
            self.shift_bone_in_world_space(pelvis, frame, &left_delta);

            let right_delta =
                (target_right - self.bone_position_in_world_space(right_foot, frame)) * 0.5;
            self.shift_bone_in_world_space(pelvis, frame, &right_delta);
        }

        Ok(())
    }

    /// Adds `delta` to a bone's world position in one frame; the subtree
    /// follows.
    fn shift_bone_in_world_space(&mut self, bone: usize, frame: usize, delta: &Vector3<f64>) {
        let world = &mut self.frames[frame].entries[bone].world_transform;
        let moved = transform::translation(world) + delta;
        transform::set_translation(world, &moved);
        self.move_bone_with_subtree(bone, frame);
    }

    // ─── Cross-animation copies ───────────────────────────────────────────────

    /// Freezes `bone` on one pose: every frame receives the local transform
    /// `target_bone` has at `target_frame` of `target`.
    pub fn copy_bone_transformation(
        &mut self,
        bone: usize,
        target: &Animation,
        target_bone: usize,
        target_frame: usize,
    ) -> Result<(), AnimationError> {
        target.ensure_frame(target_frame)?;
        let local = target.frames[target_frame].entries[target_bone].local_transform;

        for frame in 0..self.frames.len() {
            self.frames[frame].entries[bone].local_transform = local;
            self.update_world_from_local(bone, frame);
        }
        Ok(())
    }

    /// Copies the first-frame local pose of `reference_bone` into every frame
    /// of `bone`.
    pub fn copy_reference_bone_pose(
        &mut self,
        bone: usize,
        reference: &Animation,
        reference_bone: usize,
    ) -> Result<(), AnimationError> {
        if reference.frames.is_empty() {
            return Err(AnimationError::NoFrames {
                animation: reference.name.clone(),
            });
        }
        self.copy_bone_transformation(bone, reference, reference_bone, 0)
    }

    /// Places `bone` at the world position `target_bone` has in the same frame
    /// index of `target`. The bone's orientation is kept and its subtree
    /// follows.
    pub fn translate_to_bone_in_world_space(
        &mut self,
        bone: usize,
        target: &Animation,
        target_bone: usize,
    ) -> Result<(), AnimationError> {
        self.ensure_frames_cover(target)?;

        for frame in 0..self.frames.len() {
            let position = target.bone_position_in_world_space(target_bone, frame);
            transform::set_translation(
                &mut self.frames[frame].entries[bone].world_transform,
                &position,
            );
            self.move_bone_with_subtree(bone, frame);
        }
        Ok(())
    }
}
