//! Structural edits: operations that change the node topology and keep every
//! frame's entry array aligned with it.

use std::collections::HashSet;

use nalgebra::Vector3;

use super::{Animation, FrameEntry, Node, find_node_by_name, rebuild_children, subtree_of};
use crate::error::AnimationError;
use crate::transform::from_euler_translation;

impl Animation {
    /// Renames `bone`. Fails when another bone already uses `new_name`
    /// (case-insensitive).
    pub fn rename_bone(&mut self, bone: usize, new_name: &str) -> Result<(), AnimationError> {
        check_bone_name(new_name)?;
        let collides = self
            .nodes
            .iter()
            .any(|node| node.index != bone && node.name.eq_ignore_ascii_case(new_name));
        if collides {
            return Err(AnimationError::DuplicateBoneName {
                animation: self.name.clone(),
                name: new_name.to_string(),
            });
        }

        tracing::debug!(
            "{}: rename bone '{}' -> '{}'",
            self.name,
            self.nodes[bone].name,
            new_name
        );
        self.nodes[bone].name = new_name.to_string();
        Ok(())
    }

    /// Removes `bone` and its entry from every frame.
    ///
    /// The removed bone's children become roots; they are not attached to the
    /// removed bone's parent. Their world pose is kept, so their local
    /// transforms are recomputed from it. Every other bone keeps both of its
    /// transforms.
    pub fn remove_bone(&mut self, bone: usize) {
        let orphans: Vec<String> = self.nodes[bone]
            .children
            .iter()
            .map(|&child| self.nodes[child].name.clone())
            .collect();

        tracing::debug!("{}: remove bone '{}'", self.name, self.nodes[bone].name);

        let old_nodes = std::mem::take(&mut self.nodes);

        let mut new_nodes: Vec<Node> = old_nodes
            .iter()
            .filter(|node| node.index != bone)
            .enumerate()
            .map(|(index, node)| Node {
                name: node.name.clone(),
                index,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        // Resolve parents by name against the compacted list.
        for new_index in 0..new_nodes.len() {
            let old_index = if new_index < bone {
                new_index
            } else {
                new_index + 1
            };
            new_nodes[new_index].parent = old_nodes[old_index]
                .parent
                .filter(|&parent| parent != bone)
                .and_then(|parent| find_node_by_name(&new_nodes, &old_nodes[parent].name));
        }
        rebuild_children(&mut new_nodes);
        self.nodes = new_nodes;

        for frame in &mut self.frames {
            frame.entries.remove(bone);
        }

        for orphan in orphans {
            if let Some(index) = self.find_bone(&orphan) {
                self.update_local_from_world_all_frames(index);
            }
        }
    }

    /// Inserts a new bone and returns its index.
    ///
    /// The bone lands right after `parent`, or at index 1 when it has no
    /// parent so the primary root keeps index 0. Every index at or above the
    /// slot shifts up by one. Each frame receives the same local transform
    /// built from `local_position` and `local_angles`.
    pub fn add_bone(
        &mut self,
        name: &str,
        local_position: &Vector3<f64>,
        local_angles: &Vector3<f64>,
        parent: Option<usize>,
    ) -> Result<usize, AnimationError> {
        check_bone_name(name)?;
        if self.find_bone(name).is_some() {
            return Err(AnimationError::DuplicateBoneName {
                animation: self.name.clone(),
                name: name.to_string(),
            });
        }

        let slot = match parent {
            Some(parent) => parent + 1,
            None => 1.min(self.nodes.len()),
        };
        let shift = |index: usize| if index >= slot { index + 1 } else { index };

        for node in &mut self.nodes {
            node.index = shift(node.index);
            node.parent = node.parent.map(shift);
            for child in &mut node.children {
                *child = shift(*child);
            }
        }

        self.nodes.insert(
            slot,
            Node {
                name: name.to_string(),
                index: slot,
                parent,
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent {
            self.nodes[parent].children.push(slot);
        }

        let local = from_euler_translation(local_angles, local_position);
        for frame in &mut self.frames {
            frame.entries.insert(slot, FrameEntry::from_local(local));
        }
        self.update_world_from_local_all_frames(slot);

        tracing::debug!("{}: add bone '{}' at index {}", self.name, name, slot);
        Ok(slot)
    }

    /// Moves `bone` and its whole subtree under `new_parent` without moving
    /// anything in world space.
    ///
    /// The node list is reordered: all other bones keep their relative order
    /// and the moved subtree is spliced in right after `new_parent`. Frames
    /// are permuted to match, then local transforms are recomputed from the
    /// unchanged world transforms.
    pub fn replace_bone_parent(
        &mut self,
        bone: usize,
        new_parent: usize,
    ) -> Result<(), AnimationError> {
        let moving = subtree_of(&self.nodes, bone);
        let moving_set: HashSet<usize> = moving.iter().copied().collect();

        if moving_set.contains(&new_parent) {
            return Err(AnimationError::InvalidParent {
                bone: self.nodes[bone].name.clone(),
                parent: self.nodes[new_parent].name.clone(),
                reason: "the new parent is part of the moved subtree",
            });
        }

        tracing::debug!(
            "{}: reparent '{}' under '{}'",
            self.name,
            self.nodes[bone].name,
            self.nodes[new_parent].name
        );

        // New order expressed as old indices.
        let mut new_order: Vec<usize> = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            if moving_set.contains(&index) {
                continue;
            }
            new_order.push(index);
            if index == new_parent {
                new_order.extend(moving.iter().copied());
            }
        }

        let mut old_to_new = vec![0usize; self.nodes.len()];
        for (new_index, &old_index) in new_order.iter().enumerate() {
            old_to_new[old_index] = new_index;
        }

        let mut new_nodes: Vec<Node> = new_order
            .iter()
            .enumerate()
            .map(|(new_index, &old_index)| {
                let old = &self.nodes[old_index];
                let parent = if old_index == bone {
                    Some(new_parent)
                } else {
                    old.parent
                };
                Node {
                    name: old.name.clone(),
                    index: new_index,
                    parent: parent.map(|p| old_to_new[p]),
                    children: Vec::new(),
                }
            })
            .collect();
        rebuild_children(&mut new_nodes);
        self.nodes = new_nodes;

        for frame in &mut self.frames {
            frame.entries = new_order
                .iter()
                .map(|&old_index| frame.entries[old_index])
                .collect();
        }

        for root in self.roots() {
            self.update_local_from_world_all_frames(root);
        }
        Ok(())
    }
}

/// Names are written between double quotes, so they must be non-empty and
/// quote-free to read back.
fn check_bone_name(name: &str) -> Result<(), AnimationError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains('"') {
        "name contains a double quote"
    } else if name.contains(['\n', '\r']) {
        "name contains a line break"
    } else {
        return Ok(());
    };
    Err(AnimationError::InvalidBoneName {
        name: name.to_string(),
        reason,
    })
}
