use std::fs;
use std::path::Path;
use std::str::Lines;

use nalgebra::Vector3;

use crate::animation::{Animation, Frame, FrameEntry, Node, find_node_by_name};
use crate::error::SmdError;
use crate::transform;

/// Line cursor over one SMD document. Lives for a single parse call.
struct SmdReader<'a> {
    lines: Lines<'a>,
    /// 1-based number of the line returned last.
    line: usize,
    seen_skeleton: bool,
}

impl<'a> SmdReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line: 0,
            seen_skeleton: false,
        }
    }

    /// Next line with surrounding whitespace removed.
    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.line += 1;
        Some(line.trim())
    }

    /// Consumes lines up to and including the next one starting with `end`.
    fn skip_block(&mut self) {
        while let Some(line) = self.next_line() {
            if line.starts_with("end") {
                return;
            }
        }
    }

    fn read_nodes(&mut self, animation: &mut Animation) -> Result<(), SmdError> {
        if !animation.nodes.is_empty() {
            return Err(SmdError::InvalidHierarchy {
                line: self.line,
                reason: "duplicate `nodes` block".to_string(),
            });
        }

        let mut parents = Vec::new();
        loop {
            let Some(text) = self.next_line() else {
                return Err(SmdError::UnexpectedEof {
                    line: self.line,
                    block: "nodes",
                });
            };
            if text.is_empty() {
                continue;
            }
            if text == "end" {
                break;
            }

            let (index, name, parent) =
                parse_node_line(text).ok_or_else(|| SmdError::MalformedNode {
                    line: self.line,
                    text: text.to_string(),
                })?;

            if index != animation.nodes.len() {
                return Err(SmdError::InvalidHierarchy {
                    line: self.line,
                    reason: format!(
                        "node index {index} out of sequence, expected {}",
                        animation.nodes.len()
                    ),
                });
            }
            if find_node_by_name(&animation.nodes, name).is_some() {
                return Err(SmdError::InvalidHierarchy {
                    line: self.line,
                    reason: format!("duplicate bone name '{name}'"),
                });
            }

            animation.nodes.push(Node {
                name: name.to_string(),
                index,
                parent,
                children: Vec::new(),
            });
            parents.push((self.line, parent));
        }

        let count = animation.nodes.len();
        for &(line, parent) in &parents {
            if let Some(parent) = parent.filter(|&p| p >= count) {
                return Err(SmdError::BoneIndexOutOfRange {
                    line,
                    index: parent,
                    count,
                });
            }
        }

        // A chain longer than the node count can only be a cycle.
        for (index, &(line, _)) in parents.iter().enumerate() {
            let mut current = animation.nodes[index].parent;
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > count {
                    return Err(SmdError::InvalidHierarchy {
                        line,
                        reason: format!(
                            "bone '{}' is its own ancestor",
                            animation.nodes[index].name
                        ),
                    });
                }
                current = animation.nodes[parent].parent;
            }
        }

        crate::animation::rebuild_children(&mut animation.nodes);
        tracing::debug!("{}: {} nodes", animation.name, count);
        Ok(())
    }

    fn read_skeleton(&mut self, animation: &mut Animation) -> Result<(), SmdError> {
        if self.seen_skeleton {
            return Err(SmdError::InvalidHierarchy {
                line: self.line,
                reason: "duplicate `skeleton` block".to_string(),
            });
        }
        if animation.nodes.is_empty() {
            return Err(SmdError::InvalidHierarchy {
                line: self.line,
                reason: "`skeleton` block before `nodes` block".to_string(),
            });
        }
        self.seen_skeleton = true;

        let count = animation.nodes.len();
        loop {
            let Some(text) = self.next_line() else {
                return Err(SmdError::UnexpectedEof {
                    line: self.line,
                    block: "skeleton",
                });
            };
            if text.is_empty() {
                continue;
            }

            let mut words = text.split_whitespace();
            match words.next() {
                Some("end") => break,
                Some("time") => {
                    if words.next().and_then(|w| w.parse::<i64>().ok()).is_none() {
                        return Err(SmdError::MalformedTransform {
                            line: self.line,
                            text: text.to_string(),
                        });
                    }
                    // Bones without a line in this block keep the previous pose.
                    let entries = match animation.frames.last() {
                        Some(previous) => previous.entries.clone(),
                        None => vec![FrameEntry::default(); count],
                    };
                    animation.frames.push(Frame { entries });
                }
                _ => {
                    let (index, position, mut angles) =
                        parse_transform_line(text).ok_or_else(|| SmdError::MalformedTransform {
                            line: self.line,
                            text: text.to_string(),
                        })?;
                    if index >= count {
                        return Err(SmdError::BoneIndexOutOfRange {
                            line: self.line,
                            index,
                            count,
                        });
                    }
                    let Some(frame) = animation.frames.last_mut() else {
                        return Err(SmdError::TransformBeforeTime { line: self.line });
                    };

                    transform::wrap_angles(&mut angles);
                    frame.entries[index] =
                        FrameEntry::from_local(transform::from_euler_translation(&angles, &position));
                }
            }
        }

        animation.build_world_transforms();
        tracing::debug!("{}: {} frames", animation.name, animation.frames.len());
        Ok(())
    }
}

/// Parses `index "name" parent`; a parent of `-1` means root.
fn parse_node_line(text: &str) -> Option<(usize, &str, Option<usize>)> {
    let open = text.find('"')?;
    let index = text[..open].trim().parse::<usize>().ok()?;

    let rest = &text[open + 1..];
    let close = rest.find('"')?;
    let name = &rest[..close];
    if name.is_empty() {
        return None;
    }

    let parent = match rest[close + 1..].trim().parse::<i64>().ok()? {
        -1 => None,
        p if p >= 0 => Some(usize::try_from(p).ok()?),
        _ => return None,
    };
    Some((index, name, parent))
}

/// Parses `index tx ty tz rx ry rz`.
fn parse_transform_line(text: &str) -> Option<(usize, Vector3<f64>, Vector3<f64>)> {
    let mut words = text.split_whitespace();
    let index = words.next()?.parse::<usize>().ok()?;

    let mut values = [0.0_f64; 6];
    for value in &mut values {
        *value = words.next()?.parse().ok()?;
    }
    if words.next().is_some() {
        return None;
    }

    Some((
        index,
        Vector3::new(values[0], values[1], values[2]),
        Vector3::new(values[3], values[4], values[5]),
    ))
}

/// Parses an SMD document held in memory.
///
/// # Arguments
///
/// * `name` - Name given to the resulting animation.
/// * `text` - Full file contents.
///
/// # Returns
///
/// The animation with every world transform resolved.
///
/// # Errors
///
/// Any grammar violation is returned as an [`SmdError`] carrying the line it
/// was found on. Unknown top-level blocks are skipped with a warning.
pub fn parse_animation(name: &str, text: &str) -> Result<Animation, SmdError> {
    let mut reader = SmdReader::new(text);
    let mut animation = Animation::new(name);

    while let Some(line) = reader.next_line() {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        match command {
            "version" => {
                let version = words.next().unwrap_or_default();
                if version.parse::<i64>().ok() != Some(1) {
                    return Err(SmdError::BadVersion {
                        line: reader.line,
                        version: version.to_string(),
                    });
                }
            }
            "nodes" => reader.read_nodes(&mut animation)?,
            "skeleton" => reader.read_skeleton(&mut animation)?,
            other => {
                tracing::warn!(
                    "{}: skipping unknown block '{}' at line {}",
                    name,
                    other,
                    reader.line
                );
                reader.skip_block();
            }
        }
    }

    Ok(animation)
}

/// Reads and parses an SMD file. The animation is named after the file.
pub fn load_animation(path: &Path) -> Result<Animation, SmdError> {
    tracing::info!("loading {}", path.display());

    let bytes = fs::read(path).map_err(|source| SmdError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|error| {
        let valid = &error.as_bytes()[..error.utf8_error().valid_up_to()];
        SmdError::InvalidEncoding {
            line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
        }
    })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    parse_animation(&name, &text)
}
