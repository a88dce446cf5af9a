//! Batch job files: which SMD files to load, which operations to run on each
//! and where to write the results.

mod runner;

use std::collections::BTreeMap;
use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::animation::{BoneMappingEntry, Mode, Space};

pub use runner::{BatchReport, run_batch};

/// Animation an operation reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimationSource {
    /// The animation being edited, as it is at this point of the run.
    #[default]
    Animation,
    /// The untouched counterpart of the input file.
    Original,
    /// A reference skeleton declared in [`BatchConfig::references`].
    Reference(String),
}

impl AnimationSource {
    fn original() -> Self {
        AnimationSource::Original
    }
}

/// A vector operand: literal components or the name of a variable set by an
/// earlier `get_bone_*` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorParam {
    Literal([f64; 3]),
    Variable(String),
}

impl Default for VectorParam {
    fn default() -> Self {
        VectorParam::Literal([0.0; 3])
    }
}

/// One step of a file's operation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationConfig {
    ReplaceBoneParent {
        bone: String,
        parent: String,
    },
    RemoveBone {
        bone: String,
    },
    AddBone {
        name: String,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        position: VectorParam,
        #[serde(default)]
        angles: VectorParam,
    },
    RenameBone {
        bone: String,
        name: String,
    },
    RotateBone {
        bone: String,
        angles: VectorParam,
        #[serde(default)]
        space: Space,
        #[serde(default)]
        mode: Mode,
    },
    TranslateBone {
        bone: String,
        offset: VectorParam,
        #[serde(default)]
        space: Space,
        #[serde(default)]
        mode: Mode,
    },
    FixupBoneLengths {
        reference: String,
        /// `(reference bone, animation bone)` pairs for renamed bones.
        #[serde(default)]
        overrides: Vec<BoneMappingEntry>,
    },
    SolveFoots {
        left_foot: String,
        right_foot: String,
        pelvis: String,
        #[serde(default = "AnimationSource::original")]
        source: AnimationSource,
        /// Defaults to `left_foot`.
        #[serde(default)]
        source_left_foot: Option<String>,
        /// Defaults to `right_foot`.
        #[serde(default)]
        source_right_foot: Option<String>,
    },
    TranslateToBone {
        bone: String,
        source: AnimationSource,
        /// Defaults to `bone`.
        #[serde(default)]
        source_bone: Option<String>,
    },
    CopyBoneTransformation {
        bone: String,
        source: AnimationSource,
        /// Defaults to `bone`.
        #[serde(default)]
        source_bone: Option<String>,
        #[serde(default)]
        frame: usize,
    },
    CopyReferenceBonePose {
        reference: String,
        /// `(animation bone, reference bone)` pairs.
        bones: Vec<BoneMappingEntry>,
    },
    GetBonePosition {
        variable: String,
        #[serde(default)]
        source: AnimationSource,
        bone: String,
        #[serde(default)]
        space: Space,
        #[serde(default)]
        frame: usize,
    },
    GetBoneAngles {
        variable: String,
        #[serde(default)]
        source: AnimationSource,
        bone: String,
        #[serde(default)]
        space: Space,
        #[serde(default)]
        frame: usize,
    },
    ScaleVariable {
        variable: String,
        scale: f64,
    },
    /// Writes `<output_dir>/<file>_<suffix>.obj` for the current state.
    WriteObj {
        suffix: String,
        #[serde(default)]
        frame: usize,
    },
}

impl OperationConfig {
    pub fn name(&self) -> &'static str {
        match self {
            OperationConfig::ReplaceBoneParent { .. } => "replace_bone_parent",
            OperationConfig::RemoveBone { .. } => "remove_bone",
            OperationConfig::AddBone { .. } => "add_bone",
            OperationConfig::RenameBone { .. } => "rename_bone",
            OperationConfig::RotateBone { .. } => "rotate_bone",
            OperationConfig::TranslateBone { .. } => "translate_bone",
            OperationConfig::FixupBoneLengths { .. } => "fixup_bone_lengths",
            OperationConfig::SolveFoots { .. } => "solve_foots",
            OperationConfig::TranslateToBone { .. } => "translate_to_bone",
            OperationConfig::CopyBoneTransformation { .. } => "copy_bone_transformation",
            OperationConfig::CopyReferenceBonePose { .. } => "copy_reference_bone_pose",
            OperationConfig::GetBonePosition { .. } => "get_bone_position",
            OperationConfig::GetBoneAngles { .. } => "get_bone_angles",
            OperationConfig::ScaleVariable { .. } => "scale_variable",
            OperationConfig::WriteObj { .. } => "write_obj",
        }
    }
}

fn default_extension() -> String {
    "smd".to_string()
}

/// A set of files sharing input/output directories and an operation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub input_dir: PathBuf,
    /// Directory holding the untouched counterparts; the input itself is
    /// used when absent.
    #[serde(default)]
    pub original_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// File names without extension.
    pub files: Vec<String>,
    /// Run on every file, in order.
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
    /// Extra operations run after `operations` for the named files.
    #[serde(default)]
    pub file_operations: BTreeMap<String, Vec<OperationConfig>>,
    /// Also write a frame 0 OBJ dump next to each output.
    #[serde(default)]
    pub write_obj: bool,
}

/// Root of a batch job file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Reference skeletons by name, loaded once per run.
    #[serde(default)]
    pub references: BTreeMap<String, PathBuf>,
    pub pipelines: Vec<PipelineConfig>,
}

impl BatchConfig {
    /// A small but complete job used by the `template` command.
    pub fn example() -> Self {
        let mut references = BTreeMap::new();
        references.insert(
            "target".to_string(),
            PathBuf::from("reference/target_skeleton.smd"),
        );

        let mut file_operations = BTreeMap::new();
        file_operations.insert(
            "idle".to_string(),
            vec![OperationConfig::CopyBoneTransformation {
                bone: "Bip01 Head".to_string(),
                source: AnimationSource::Reference("target".to_string()),
                source_bone: None,
                frame: 0,
            }],
        );

        Self {
            references,
            pipelines: vec![PipelineConfig {
                name: "retarget".to_string(),
                input_dir: PathBuf::from("input"),
                original_dir: None,
                output_dir: PathBuf::from("output"),
                extension: default_extension(),
                files: vec!["idle".to_string(), "walk".to_string()],
                operations: vec![
                    OperationConfig::RenameBone {
                        bone: "Bip01 Spine".to_string(),
                        name: "Bip01 Spine1".to_string(),
                    },
                    OperationConfig::GetBonePosition {
                        variable: "gun_position".to_string(),
                        source: AnimationSource::Reference("target".to_string()),
                        bone: "Bip01 R Hand".to_string(),
                        space: Space::Local,
                        frame: 0,
                    },
                    OperationConfig::AddBone {
                        name: "Gun".to_string(),
                        parent: Some("Bip01 R Hand".to_string()),
                        position: VectorParam::Variable("gun_position".to_string()),
                        angles: VectorParam::default(),
                    },
                    OperationConfig::FixupBoneLengths {
                        reference: "target".to_string(),
                        overrides: vec![("Bip01 Neck".to_string(), "Bip01 Neck1".to_string())],
                    },
                    OperationConfig::SolveFoots {
                        left_foot: "Bip01 L Foot".to_string(),
                        right_foot: "Bip01 R Foot".to_string(),
                        pelvis: "Bip01 Pelvis".to_string(),
                        source: AnimationSource::Original,
                        source_left_foot: None,
                        source_right_foot: None,
                    },
                ],
                file_operations,
                write_obj: false,
            }],
        }
    }
}

/// Save a batch job file as pretty JSON.
pub fn save_batch_config(path: &Path, config: &BatchConfig) -> Result<()> {
    let content =
        serde_json::to_string_pretty(config).context("failed to serialize batch config as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save batch config: {}", path.display()))?;
    Ok(())
}

/// Load a batch job file.
pub fn load_batch_config(path: &Path) -> Result<BatchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load batch config: {}", path.display()))?;
    let config: BatchConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse batch config JSON: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_example_config_when_serialize_then_operations_are_tagged() {
        let json = serde_json::to_string(&BatchConfig::example()).expect("serialize config");
        assert!(json.contains("\"op\":\"solve_foots\""));
        assert!(json.contains("\"source\":{\"reference\":\"target\"}"));
        assert!(json.contains("\"position\":\"gun_position\""));
    }

    #[test]
    fn given_minimal_json_when_parsing_then_defaults_are_filled() {
        let json = r#"{
            "pipelines": [{
                "name": "fix",
                "input_dir": "in",
                "output_dir": "out",
                "files": ["walk"],
                "operations": [
                    { "op": "rotate_bone", "bone": "Spine", "angles": [0.0, 0.0, 1.5] },
                    { "op": "translate_bone", "bone": "Pelvis", "offset": "lift",
                      "space": "world", "mode": "absolute" },
                    { "op": "solve_foots", "left_foot": "L", "right_foot": "R", "pelvis": "P" }
                ]
            }]
        }"#;

        let config: BatchConfig = serde_json::from_str(json).expect("parse config");
        let pipeline = &config.pipelines[0];

        assert!(config.references.is_empty());
        assert_eq!(pipeline.extension, "smd");
        assert!(!pipeline.write_obj);
        assert_eq!(
            pipeline.operations[0],
            OperationConfig::RotateBone {
                bone: "Spine".to_string(),
                angles: VectorParam::Literal([0.0, 0.0, 1.5]),
                space: Space::Local,
                mode: Mode::Relative,
            }
        );
        assert!(matches!(
            &pipeline.operations[1],
            OperationConfig::TranslateBone { offset: VectorParam::Variable(name), space: Space::World, mode: Mode::Absolute, .. }
                if name == "lift"
        ));
        assert!(matches!(
            &pipeline.operations[2],
            OperationConfig::SolveFoots { source: AnimationSource::Original, .. }
        ));
    }

    #[test]
    fn given_saved_config_when_loading_then_it_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.json");

        save_batch_config(&path, &BatchConfig::example()).expect("save");
        let loaded = load_batch_config(&path).expect("load");

        assert_eq!(loaded, BatchConfig::example());
    }

    #[test]
    fn given_unknown_operation_when_parsing_then_error_is_returned() {
        let json = r#"{ "pipelines": [{ "name": "x", "input_dir": "i", "output_dir": "o",
            "files": [], "operations": [{ "op": "explode" }] }] }"#;
        assert!(serde_json::from_str::<BatchConfig>(json).is_err());
    }
}
