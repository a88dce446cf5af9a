use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::animation::Animation;
use crate::error::SmdError;
use crate::transform;

/// Largest six-decimal angle inside `[-π, π]`. Printing `±3.141593` would
/// be wrapped to the other sign on the next read.
const PRINTABLE_PI: f64 = 3.141592;

/// Serializes an animation as SMD text.
///
/// Local transforms are decoded back to translation and Z-Y-X Euler angles
/// and written with six decimals. Components that would print as `-0.000000`
/// are written as `0.000000`.
pub fn write_animation<W: Write>(animation: &Animation, mut writer: W) -> io::Result<()> {
    writeln!(writer, "version 1")?;
    writeln!(writer, "nodes")?;
    for node in &animation.nodes {
        let parent = node.parent.map_or(-1, |p| p as i64);
        writeln!(writer, "{:3} \"{}\" {}", node.index, node.name, parent)?;
    }
    writeln!(writer, "end")?;

    writeln!(writer, "skeleton")?;
    for (time, frame) in animation.frames.iter().enumerate() {
        writeln!(writer, "time {time}")?;
        for (index, entry) in frame.entries.iter().enumerate() {
            let mut position = transform::translation(&entry.local_transform);
            let mut angles = transform::euler_angles(&entry.local_transform)
                .map(|angle| angle.clamp(-PRINTABLE_PI, PRINTABLE_PI));
            transform::canonicalize_zero(&mut position);
            transform::canonicalize_zero(&mut angles);

            writeln!(
                writer,
                "{:3}   {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
                index, position.x, position.y, position.z, angles.x, angles.y, angles.z
            )?;
        }
    }
    writeln!(writer, "end")?;
    Ok(())
}

/// Writes an animation to `path` in SMD format.
pub fn save_animation(animation: &Animation, path: &Path) -> Result<(), SmdError> {
    let mut out = Vec::new();
    write_animation(animation, &mut out)
        .and_then(|()| fs::write(path, out))
        .map_err(|source| SmdError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!("wrote {}", path.display());
    Ok(())
}

const AXIS_GROUPS: [&str; 3] = ["Forward", "Right", "Up"];

/// Dumps one frame as Wavefront OBJ geometry for visual inspection.
///
/// Object `objSkeleton` holds one vertex per bone and a line per
/// parent/child pair. Object `objMatrices` holds three groups
/// (`grpForward`, `grpRight`, `grpUp`) with a unit-length segment along the
/// matching basis axis of every bone.
///
/// # Panics
///
/// When `frame` is not a frame of `animation`.
pub fn write_skeleton_obj<W: Write>(
    animation: &Animation,
    frame: usize,
    mut writer: W,
) -> io::Result<()> {
    let entries = &animation.frames[frame].entries;

    writeln!(writer, "o objSkeleton\n")?;
    for entry in entries {
        let position = transform::translation(&entry.world_transform);
        writeln!(writer, "v {:.6} {:.6} {:.6}", position.x, position.y, position.z)?;
    }
    writeln!(writer)?;

    for node in &animation.nodes {
        if let Some(parent) = node.parent {
            writeln!(writer, "l {} {}", parent + 1, node.index + 1)?;
        }
    }
    writeln!(writer)?;

    writeln!(writer, "o objMatrices\n")?;
    let mut vertex_count = entries.len();
    for (axis, group) in AXIS_GROUPS.iter().enumerate() {
        writeln!(writer, "g grp{group}\n")?;

        let axis_base = vertex_count + 1;
        for entry in entries {
            let position = transform::translation(&entry.world_transform);
            let direction = transform::basis(&entry.world_transform, axis);
            let tip = position + direction.try_normalize(0.0).unwrap_or(direction);
            writeln!(writer, "v {:.6} {:.6} {:.6}", tip.x, tip.y, tip.z)?;
        }
        vertex_count += entries.len();
        writeln!(writer)?;

        for node in &animation.nodes {
            writeln!(writer, "l {} {}", node.index + 1, axis_base + node.index)?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

/// Writes the OBJ dump of `frame` to `path`.
pub fn save_skeleton_obj(animation: &Animation, frame: usize, path: &Path) -> Result<(), SmdError> {
    let mut out = Vec::new();
    write_skeleton_obj(animation, frame, &mut out)
        .and_then(|()| fs::write(path, out))
        .map_err(|source| SmdError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::smd::parse_animation;

    fn chain() -> Animation {
        parse_animation(
            "chain.smd",
            "version 1
nodes
  0 \"Root\" -1
  1 \"Tip\" 0
end
skeleton
time 0
  0   0.000000 0.000000 0.000000 0.000000 0.000000 0.000000
  1   0.000000 0.000000 2.000000 0.000000 0.000000 0.000000
end
",
        )
        .expect("parse")
    }

    fn serialize(animation: &Animation) -> String {
        let mut out = Vec::new();
        write_animation(animation, &mut out).expect("write");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn given_animation_when_writing_then_layout_matches_format() {
        let text = serialize(&chain());
        assert_eq!(
            text,
            "version 1
nodes
  0 \"Root\" -1
  1 \"Tip\" 0
end
skeleton
time 0
  0   0.000000 0.000000 0.000000 0.000000 0.000000 0.000000
  1   0.000000 0.000000 2.000000 0.000000 0.000000 0.000000
end
"
        );
    }

    #[test]
    fn given_negative_zero_components_when_writing_then_they_print_positive() {
        let mut anim = chain();
        transform::set_translation(
            &mut anim.frames[0].entries[1].local_transform,
            &Vector3::new(-0.0, -1e-9, 2.0),
        );

        let text = serialize(&anim);
        assert!(!text.contains("-0.000000"));
        assert!(text.contains("  1   0.000000 0.000000 2.000000"));
    }

    #[test]
    fn given_rotated_bone_when_reparsing_output_then_second_write_is_identical() {
        let mut anim = chain();
        anim.rotate_bone(
            1,
            &Vector3::new(0.3, -0.2, 1.1),
            crate::animation::Space::Local,
            crate::animation::Mode::Relative,
        );

        let first = serialize(&anim);
        let reparsed = parse_animation("chain.smd", &first).expect("reparse");
        let second = serialize(&reparsed);

        assert_eq!(first, second);
        let expected = anim.frames[0].entries[1].world_transform;
        assert!((reparsed.frames[0].entries[1].world_transform - expected).amax() < 1e-4);
    }

    #[test]
    fn given_angle_next_to_minus_pi_when_round_tripping_twice_then_text_is_stable() {
        let source = parse_animation(
            "flip.smd",
            "version 1
nodes
  0 \"Root\" -1
end
skeleton
time 0
  0   1.000000 2.000000 3.000000 -1.128573 -3.141593 0.000000
end
",
        )
        .expect("parse");

        let first = serialize(&source);
        assert!(!first.contains("3.141593"));

        let reparsed = parse_animation("flip.smd", &first).expect("reparse");
        let second = serialize(&reparsed);
        let third = serialize(&parse_animation("flip.smd", &second).expect("reparse twice"));

        assert_eq!(first, second);
        assert_eq!(second, third);
        let expected = source.frames[0].entries[0].world_transform;
        assert!((reparsed.frames[0].entries[0].world_transform - expected).amax() < 1e-4);
    }

    #[test]
    fn given_chain_when_dumping_obj_then_lines_link_parent_and_axes() {
        let mut out = Vec::new();
        write_skeleton_obj(&chain(), 0, &mut out).expect("obj");
        let text = String::from_utf8(out).expect("utf8");

        assert!(text.starts_with("o objSkeleton\n\nv 0.000000 0.000000 0.000000\nv 0.000000 0.000000 2.000000\n"));
        assert!(text.contains("\nl 1 2\n"));
        assert!(text.contains("g grpForward\n\nv 1.000000 0.000000 0.000000\n"));
        assert!(text.contains("g grpUp\n\nv 0.000000 0.000000 1.000000\nv 0.000000 0.000000 3.000000\n"));
        // Up group vertices are 7 and 8.
        assert!(text.contains("\nl 2 8\n"));
        assert_eq!(text.matches("\nv ").count(), 8);
    }
}
