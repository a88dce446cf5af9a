use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use nalgebra::Vector3;

use super::{AnimationSource, BatchConfig, OperationConfig, PipelineConfig, VectorParam};
use crate::animation::{Animation, Space};
use crate::error::SmdError;
use crate::logging::ResultExt;
use crate::smd;

/// Outcome of a batch run, as `<pipeline>/<file>` labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
}

/// Runs every pipeline of `config`.
///
/// # Errors
///
/// Loading a reference fails the run, as does any SMD format error. Other
/// failures (missing files, unknown bones, ...) are logged, recorded in
/// [`BatchReport::failed`] and the next file proceeds.
pub fn run_batch(config: &BatchConfig) -> Result<BatchReport> {
    let mut references = BTreeMap::new();
    for (name, path) in &config.references {
        let reference = smd::load_animation(path)
            .with_context(|| format!("failed to load reference '{name}'"))?;
        references.insert(name.clone(), reference);
    }

    let mut report = BatchReport::default();
    for pipeline in &config.pipelines {
        tracing::info!(
            "pipeline '{}': {} files",
            pipeline.name,
            pipeline.files.len()
        );

        for file in &pipeline.files {
            let label = format!("{}/{}", pipeline.name, file);
            let result = run_file(pipeline, file, &references);
            if result.as_ref().is_err_and(is_format_failure) {
                return result
                    .map(|()| report)
                    .with_context(|| format!("aborting batch at {label}"));
            }

            match result.log_error(Some(&label)) {
                Ok(()) => report.processed.push(label),
                Err(_) => report.failed.push(label),
            }
        }
    }

    tracing::info!(
        "batch finished: {} processed, {} failed",
        report.processed.len(),
        report.failed.len()
    );
    Ok(report)
}

fn is_format_failure(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<SmdError>()
        .is_some_and(SmdError::is_format_error)
}

fn run_file(
    pipeline: &PipelineConfig,
    file: &str,
    references: &BTreeMap<String, Animation>,
) -> Result<()> {
    let file_name = format!("{}.{}", file, pipeline.extension);

    let mut animation = smd::load_animation(&pipeline.input_dir.join(&file_name))?;
    let original = match &pipeline.original_dir {
        Some(dir) => smd::load_animation(&dir.join(&file_name))?,
        None => animation.clone(),
    };

    let mut context = FileContext {
        references,
        original,
        variables: HashMap::new(),
        output_dir: &pipeline.output_dir,
        file,
    };

    let extra = pipeline
        .file_operations
        .get(file)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for operation in pipeline.operations.iter().chain(extra) {
        tracing::debug!("{}: {}", file_name, operation.name());
        context
            .apply(&mut animation, operation)
            .with_context(|| format!("{} failed on {}", operation.name(), file_name))?;
    }

    fs::create_dir_all(&pipeline.output_dir).with_context(|| {
        format!(
            "failed to create output directory: {}",
            pipeline.output_dir.display()
        )
    })?;
    smd::save_animation(&animation, &pipeline.output_dir.join(&file_name))?;
    if pipeline.write_obj && animation.frame_count() > 0 {
        smd::save_skeleton_obj(
            &animation,
            0,
            &pipeline.output_dir.join(format!("{file}.obj")),
        )?;
    }
    Ok(())
}

/// State visible to the operations of one file.
struct FileContext<'a> {
    references: &'a BTreeMap<String, Animation>,
    original: Animation,
    /// Keyed by lowercase name.
    variables: HashMap<String, Vector3<f64>>,
    output_dir: &'a Path,
    file: &'a str,
}

impl FileContext<'_> {
    fn reference(&self, name: &str) -> Result<&Animation> {
        self.references
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, reference)| reference)
            .ok_or_else(|| anyhow!("unknown reference '{name}'"))
    }

    /// Resolves `source`. The edited animation is snapshotted so it can be
    /// read while being mutated.
    fn source<'s>(
        &'s self,
        animation: &Animation,
        source: &AnimationSource,
    ) -> Result<Cow<'s, Animation>> {
        Ok(match source {
            AnimationSource::Animation => Cow::Owned(animation.clone()),
            AnimationSource::Original => Cow::Borrowed(&self.original),
            AnimationSource::Reference(name) => Cow::Borrowed(self.reference(name)?),
        })
    }

    fn vector(&self, param: &VectorParam) -> Result<Vector3<f64>> {
        match param {
            VectorParam::Literal([x, y, z]) => Ok(Vector3::new(*x, *y, *z)),
            VectorParam::Variable(name) => self
                .variables
                .get(&name.to_lowercase())
                .copied()
                .ok_or_else(|| anyhow!("unknown variable '{name}'")),
        }
    }

    fn apply(&mut self, animation: &mut Animation, operation: &OperationConfig) -> Result<()> {
        match operation {
            OperationConfig::ReplaceBoneParent { bone, parent } => {
                let bone = animation.bone(bone)?;
                let parent = animation.bone(parent)?;
                animation.replace_bone_parent(bone, parent)?;
            }
            OperationConfig::RemoveBone { bone } => {
                let bone = animation.bone(bone)?;
                animation.remove_bone(bone);
            }
            OperationConfig::AddBone {
                name,
                parent,
                position,
                angles,
            } => {
                let parent = parent
                    .as_deref()
                    .map(|parent| animation.bone(parent))
                    .transpose()?;
                animation.add_bone(name, &self.vector(position)?, &self.vector(angles)?, parent)?;
            }
            OperationConfig::RenameBone { bone, name } => {
                let bone = animation.bone(bone)?;
                animation.rename_bone(bone, name)?;
            }
            OperationConfig::RotateBone {
                bone,
                angles,
                space,
                mode,
            } => {
                let bone = animation.bone(bone)?;
                animation.rotate_bone(bone, &self.vector(angles)?, *space, *mode);
            }
            OperationConfig::TranslateBone {
                bone,
                offset,
                space,
                mode,
            } => {
                let bone = animation.bone(bone)?;
                animation.translate_bone(bone, &self.vector(offset)?, *space, *mode);
            }
            OperationConfig::FixupBoneLengths {
                reference,
                overrides,
            } => {
                animation.fixup_bone_lengths(self.reference(reference)?, overrides)?;
            }
            OperationConfig::SolveFoots {
                left_foot,
                right_foot,
                pelvis,
                source,
                source_left_foot,
                source_right_foot,
            } => {
                let source = self.source(animation, source)?;
                animation.solve_foots(
                    left_foot,
                    right_foot,
                    pelvis,
                    &source,
                    source_left_foot.as_deref().unwrap_or(left_foot),
                    source_right_foot.as_deref().unwrap_or(right_foot),
                )?;
            }
            OperationConfig::TranslateToBone {
                bone,
                source,
                source_bone,
            } => {
                let source = self.source(animation, source)?;
                let source_bone = source.bone(source_bone.as_deref().unwrap_or(bone))?;
                let bone = animation.bone(bone)?;
                animation.translate_to_bone_in_world_space(bone, &source, source_bone)?;
            }
            OperationConfig::CopyBoneTransformation {
                bone,
                source,
                source_bone,
                frame,
            } => {
                let source = self.source(animation, source)?;
                let source_bone = source.bone(source_bone.as_deref().unwrap_or(bone))?;
                let bone = animation.bone(bone)?;
                animation.copy_bone_transformation(bone, &source, source_bone, *frame)?;
            }
            OperationConfig::CopyReferenceBonePose { reference, bones } => {
                let reference = self.reference(reference)?;
                for (animation_bone, reference_bone) in bones {
                    let bone = animation.bone(animation_bone)?;
                    let reference_bone = reference.bone(reference_bone)?;
                    animation.copy_reference_bone_pose(bone, reference, reference_bone)?;
                }
            }
            OperationConfig::GetBonePosition {
                variable,
                source,
                bone,
                space,
                frame,
            } => {
                let value = {
                    let source = self.source(animation, source)?;
                    let bone = source.bone(bone)?;
                    source.ensure_frame(*frame)?;
                    match space {
                        Space::Local => source.bone_position_in_local_space(bone, *frame),
                        Space::World => source.bone_position_in_world_space(bone, *frame),
                    }
                };
                self.variables.insert(variable.to_lowercase(), value);
            }
            OperationConfig::GetBoneAngles {
                variable,
                source,
                bone,
                space,
                frame,
            } => {
                let value = {
                    let source = self.source(animation, source)?;
                    let bone = source.bone(bone)?;
                    source.ensure_frame(*frame)?;
                    match space {
                        Space::Local => source.bone_angles_in_local_space(bone, *frame),
                        Space::World => source.bone_angles_in_world_space(bone, *frame),
                    }
                };
                self.variables.insert(variable.to_lowercase(), value);
            }
            OperationConfig::ScaleVariable { variable, scale } => {
                let value = self
                    .variables
                    .get_mut(&variable.to_lowercase())
                    .ok_or_else(|| anyhow!("unknown variable '{variable}'"))?;
                *value *= *scale;
            }
            OperationConfig::WriteObj { suffix, frame } => {
                animation.ensure_frame(*frame)?;
                fs::create_dir_all(self.output_dir).with_context(|| {
                    format!(
                        "failed to create output directory: {}",
                        self.output_dir.display()
                    )
                })?;
                let path = self.output_dir.join(format!("{}_{}.obj", self.file, suffix));
                smd::save_skeleton_obj(animation, *frame, &path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Mode;

    const CHAIN: &str = "version 1
nodes
  0 \"Pelvis\" -1
  1 \"Spine\" 0
  2 \"Head\" 1
end
skeleton
time 0
  0   0.000000 0.000000 0.000000 0.000000 0.000000 0.000000
  1   0.000000 0.000000 8.000000 0.000000 0.000000 0.000000
  2   0.000000 0.000000 5.000000 0.000000 0.000000 0.000000
end
";

    fn context<'a>(references: &'a BTreeMap<String, Animation>, dir: &'a Path) -> FileContext<'a> {
        FileContext {
            references,
            original: smd::parse_animation("chain.smd", CHAIN).expect("parse"),
            variables: HashMap::new(),
            output_dir: dir,
            file: "chain",
        }
    }

    #[test]
    fn given_variable_when_scaling_then_translation_uses_scaled_value() {
        let references = BTreeMap::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut context = context(&references, dir.path());
        let mut animation = context.original.clone();

        for operation in [
            OperationConfig::GetBonePosition {
                variable: "Offset".to_string(),
                source: AnimationSource::Original,
                bone: "head".to_string(),
                space: Space::Local,
                frame: 0,
            },
            OperationConfig::ScaleVariable {
                variable: "offset".to_string(),
                scale: 2.0,
            },
            OperationConfig::TranslateBone {
                bone: "Head".to_string(),
                offset: VectorParam::Variable("OFFSET".to_string()),
                space: Space::Local,
                mode: Mode::Absolute,
            },
        ] {
            context.apply(&mut animation, &operation).expect("apply");
        }

        let head = animation.bone_position_in_local_space(2, 0);
        assert!((head - Vector3::new(0.0, 0.0, 15.0)).norm() < 1e-9);
    }

    #[test]
    fn given_unknown_variable_when_applying_then_error_names_it() {
        let references = BTreeMap::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut context = context(&references, dir.path());
        let mut animation = context.original.clone();

        let error = context
            .apply(
                &mut animation,
                &OperationConfig::RotateBone {
                    bone: "Spine".to_string(),
                    angles: VectorParam::Variable("twist".to_string()),
                    space: Space::Local,
                    mode: Mode::Relative,
                },
            )
            .unwrap_err();
        assert!(error.to_string().contains("twist"));
    }

    #[test]
    fn given_animation_source_when_translating_to_own_bone_then_snapshot_is_used() {
        let references = BTreeMap::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut context = context(&references, dir.path());
        let mut animation = context.original.clone();

        context
            .apply(
                &mut animation,
                &OperationConfig::TranslateToBone {
                    bone: "Head".to_string(),
                    source: AnimationSource::Animation,
                    source_bone: Some("Spine".to_string()),
                },
            )
            .expect("apply");

        let head = animation.bone_position_in_world_space(2, 0);
        assert!((head - Vector3::new(0.0, 0.0, 8.0)).norm() < 1e-9);
    }

    #[test]
    fn given_reference_when_fixing_lengths_then_reference_is_resolved_case_insensitively() {
        let mut references = BTreeMap::new();
        references.insert(
            "Target".to_string(),
            smd::parse_animation("target.smd", &CHAIN.replace("8.000000", "10.000000"))
                .expect("parse"),
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let mut context = context(&references, dir.path());
        let mut animation = context.original.clone();

        context
            .apply(
                &mut animation,
                &OperationConfig::FixupBoneLengths {
                    reference: "target".to_string(),
                    overrides: Vec::new(),
                },
            )
            .expect("apply");

        assert!((animation.bone_position_in_local_space(1, 0).norm() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn given_write_obj_operation_when_applying_then_suffixed_file_is_written() {
        let references = BTreeMap::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let mut context = context(&references, dir.path());
        let mut animation = context.original.clone();

        context
            .apply(
                &mut animation,
                &OperationConfig::WriteObj {
                    suffix: "before".to_string(),
                    frame: 0,
                },
            )
            .expect("apply");

        assert!(dir.path().join("chain_before.obj").is_file());
    }

    #[test]
    fn given_missing_input_when_running_then_file_fails_and_batch_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in");
        fs::create_dir_all(&input).expect("mkdir");
        fs::write(input.join("good.smd"), CHAIN).expect("write input");

        let config = BatchConfig {
            references: BTreeMap::new(),
            pipelines: vec![PipelineConfig {
                name: "p".to_string(),
                input_dir: input,
                original_dir: None,
                output_dir: dir.path().join("out"),
                extension: "smd".to_string(),
                files: vec!["missing".to_string(), "good".to_string()],
                operations: Vec::new(),
                file_operations: BTreeMap::new(),
                write_obj: false,
            }],
        };

        let report = run_batch(&config).expect("run");
        assert_eq!(report.failed, vec!["p/missing".to_string()]);
        assert_eq!(report.processed, vec!["p/good".to_string()]);
        assert!(dir.path().join("out/good.smd").is_file());
    }
}
