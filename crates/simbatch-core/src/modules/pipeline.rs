//! Stage planning: which commands a job runs, in which order, and which
//! artifacts each one reads and writes.

use super::command::{MacroArg, MacroCall, MacroCatalog, display_line};
use super::paths::{
    ArtifactKind, FileSet, background_input_path, signal_input_path, task_artifact_path,
};
use crate::common::RunConfig;
use crate::common::constants::MERGE_TOOL;
use crate::domain::{JobIdentity, ProcessSpec, SimbatchError, SimbatchResult, Stage};
use serde::Serialize;
use std::path::{Path, PathBuf};

const TRANSPORT_MACRO: &str = "run_transport.C";
const DIGI_MACRO: &str = "run_digi.C";
const RECO_MACRO: &str = "run_reco.C";
const QA_MACRO: &str = "run_qa.C";
const ANALYSIS_MACRO: &str = "run_analysis.C";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStage {
    pub stage: Stage,
    pub process: ProcessSpec,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl PlannedStage {
    pub fn command_line(&self) -> String {
        display_line(&self.process)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StagePlan {
    pub stages: Vec<PlannedStage>,
}

impl StagePlan {
    pub fn stage_names(&self) -> Vec<Stage> {
        self.stages.iter().map(|planned| planned.stage).collect()
    }
}

/// Canonical order, duplicates dropped. An empty selection is rejected;
/// there is no implied default subset.
pub fn select_stages(requested: &[Stage]) -> SimbatchResult<Vec<Stage>> {
    let selected = Stage::ALL
        .iter()
        .copied()
        .filter(|stage| requested.contains(stage))
        .collect::<Vec<_>>();
    if selected.is_empty() {
        return Err(SimbatchError::input_validation(
            "INPUT.STAGES",
            "no stages selected; set \"stages\" in the config or pass --stages",
        ));
    }
    Ok(selected)
}

pub fn parse_stage_list(list: &str) -> SimbatchResult<Vec<Stage>> {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::parse::<Stage>)
        .collect()
}

/// Per-task plan for the selected stages. Every process runs in `work_dir`.
pub fn plan_job(
    config: &RunConfig,
    identity: &JobIdentity,
    macros: &MacroCatalog,
    stages: &[Stage],
    work_dir: &Path,
) -> SimbatchResult<StagePlan> {
    let selected = select_stages(stages)?;
    if selected.contains(&Stage::Merge) {
        return Err(SimbatchError::input_validation(
            "INPUT.STAGES",
            "merge runs once over all tasks; use the merge command instead",
        ));
    }

    let particle = config.particle()?;
    let task = identity.task_id();
    let files = FileSet::for_task(&config.data_dir, task);
    let roots = config.generator_roots();
    let signal = signal_input_path(
        &roots,
        config.input_convention,
        config.system,
        config.energy,
        particle,
        task,
    );
    let background = background_input_path(&roots, config.system, config.energy, task);
    let events = i64::from(config.events);
    let seed = config.seed_for_task(task)?;

    let planned = selected
        .into_iter()
        .map(|stage| {
            let (call, inputs, outputs) = match stage {
                Stage::Transport => {
                    let call = MacroCall::new(macros.macro_path(TRANSPORT_MACRO))
                        .arg(background.as_path())
                        .arg(MacroArg::optional_path(signal.as_deref()))
                        .arg(files.transport.as_path())
                        .arg(files.parameters.as_path())
                        .arg(files.geo_sim.as_path())
                        .arg(config.setup.as_str())
                        .arg(events)
                        .arg(seed);
                    let mut inputs = vec![background.clone()];
                    inputs.extend(signal.clone());
                    let outputs = vec![
                        files.transport.clone(),
                        files.parameters.clone(),
                        files.geo_sim.clone(),
                    ];
                    (call, inputs, outputs)
                }
                Stage::Digitization => {
                    let call = MacroCall::new(macros.macro_path(DIGI_MACRO))
                        .arg(files.transport.as_path())
                        .arg(files.parameters.as_path())
                        .arg(files.digi.as_path())
                        .arg(events);
                    let inputs = vec![files.transport.clone(), files.parameters.clone()];
                    (call, inputs, vec![files.digi.clone()])
                }
                Stage::Reconstruction => {
                    let call = MacroCall::new(macros.macro_path(RECO_MACRO))
                        .arg(files.transport.as_path())
                        .arg(files.parameters.as_path())
                        .arg(files.digi.as_path())
                        .arg(files.reco.as_path())
                        .arg(events)
                        .arg(config.setup.as_str())
                        .arg(config.event_builder.as_str())
                        .arg(config.use_mc)
                        .arg(config.monitor);
                    let inputs = upstream_of(&files, &[ArtifactKind::Digi]);
                    (call, inputs, vec![files.reco.clone()])
                }
                Stage::Qa => {
                    let call = MacroCall::new(macros.macro_path(QA_MACRO))
                        .arg(files.transport.as_path())
                        .arg(files.parameters.as_path())
                        .arg(files.digi.as_path())
                        .arg(files.reco.as_path())
                        .arg(files.qa.as_path())
                        .arg(config.setup.as_str())
                        .arg(events);
                    let inputs = upstream_of(&files, &[ArtifactKind::Digi, ArtifactKind::Reco]);
                    (call, inputs, vec![files.qa.clone()])
                }
                Stage::Analysis => {
                    let call = MacroCall::new(macros.macro_path(ANALYSIS_MACRO))
                        .arg(files.transport.as_path())
                        .arg(files.parameters.as_path())
                        .arg(files.digi.as_path())
                        .arg(files.reco.as_path())
                        .arg(files.analysis.as_path())
                        .arg(particle.key())
                        .arg(config.system.key())
                        .arg(config.energy.key())
                        .arg(config.setup.as_str())
                        .arg(events);
                    let inputs = upstream_of(&files, &[ArtifactKind::Digi, ArtifactKind::Reco]);
                    (call, inputs, vec![files.analysis.clone()])
                }
                Stage::Merge => unreachable!("merge is rejected above"),
            };
            PlannedStage {
                stage,
                process: call.into_process(&config.interpreter).current_dir(work_dir),
                inputs,
                outputs,
            }
        })
        .collect();

    Ok(StagePlan { stages: planned })
}

fn upstream_of(files: &FileSet, extra: &[ArtifactKind]) -> Vec<PathBuf> {
    [ArtifactKind::Transport, ArtifactKind::Parameters]
        .iter()
        .chain(extra)
        .map(|kind| files.get(*kind).to_path_buf())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Qa,
    Analysis,
}

impl MergeKind {
    const fn artifact(self) -> ArtifactKind {
        match self {
            Self::Qa => ArtifactKind::Qa,
            Self::Analysis => ArtifactKind::Analysis,
        }
    }

    pub fn merged_path(self, data_dir: &Path) -> PathBuf {
        let artifact = self.artifact();
        data_dir.join(format!("{}.merged.{}", artifact.stem(), artifact.extension()))
    }
}

impl std::str::FromStr for MergeKind {
    type Err = SimbatchError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "qa" => Ok(Self::Qa),
            "analysis" => Ok(Self::Analysis),
            other => Err(SimbatchError::unknown_category(
                "merge kind",
                other,
                &["qa", "analysis"],
            )),
        }
    }
}

/// One `hadd` over the per-task outputs of tasks `1..=task_count`.
pub fn plan_merge(
    data_dir: &Path,
    kind: MergeKind,
    task_count: u32,
    work_dir: &Path,
) -> SimbatchResult<StagePlan> {
    if task_count == 0 {
        return Err(SimbatchError::input_validation(
            "INPUT.ARRAY_SIZE",
            "merge needs at least one task",
        ));
    }
    let inputs = (1..=task_count)
        .map(|index| task_artifact_path(data_dir, kind.artifact(), index))
        .collect::<Vec<_>>();
    let output = kind.merged_path(data_dir);
    let process = ProcessSpec::new(MERGE_TOOL)
        .arg("-f")
        .arg(output.to_string_lossy().into_owned())
        .args(inputs.iter().map(|path| path.to_string_lossy().into_owned()))
        .current_dir(work_dir);

    Ok(StagePlan {
        stages: vec![PlannedStage {
            stage: Stage::Merge,
            process,
            inputs,
            outputs: vec![output],
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::{MergeKind, parse_stage_list, plan_job, plan_merge, select_stages};
    use crate::common::RunConfig;
    use crate::domain::{JobIdentity, Stage};
    use crate::modules::command::MacroCatalog;
    use crate::modules::paths::{ArtifactKind, Particle, task_artifact_path};
    use std::path::{Path, PathBuf};

    fn config() -> RunConfig {
        RunConfig {
            particle: Some(Particle::Phi),
            events: 250,
            data_dir: PathBuf::from("/data/phi"),
            pluto_root: PathBuf::from("/gen/pluto"),
            urqmd_root: PathBuf::from("/gen/urqmd"),
            ..RunConfig::default()
        }
    }

    fn full_plan() -> super::StagePlan {
        plan_job(
            &config(),
            &JobIdentity::new("100", 7).unwrap(),
            &MacroCatalog::new("/opt/cbm/macro/rich/run"),
            &[
                Stage::Qa,
                Stage::Transport,
                Stage::Reconstruction,
                Stage::Digitization,
                Stage::Analysis,
                Stage::Qa,
            ],
            Path::new("/work/100_7"),
        )
        .expect("plan should build")
    }

    #[test]
    fn stages_run_in_canonical_order_without_duplicates() {
        assert_eq!(
            full_plan().stage_names(),
            vec![
                Stage::Transport,
                Stage::Digitization,
                Stage::Reconstruction,
                Stage::Qa,
                Stage::Analysis
            ]
        );
    }

    #[test]
    fn downstream_inputs_are_upstream_outputs() {
        let plan = full_plan();
        let transport = &plan.stages[0];
        let digi = &plan.stages[1];
        let reco = &plan.stages[2];

        for input in &digi.inputs {
            assert!(transport.outputs.contains(input), "{} not produced", input.display());
        }
        assert!(reco.inputs.contains(&digi.outputs[0]));
        assert_eq!(digi.outputs[0], Path::new("/data/phi/digi.00007.root"));
    }

    #[test]
    fn transport_call_carries_generator_inputs_and_seed() {
        let plan = full_plan();
        let transport = &plan.stages[0];
        assert_eq!(transport.process.program, "root");
        assert_eq!(transport.process.current_dir.as_deref(), Some(Path::new("/work/100_7")));
        assert_eq!(
            transport.process.args[3],
            concat!(
                "/opt/cbm/macro/rich/run/run_transport.C(",
                "\"/gen/urqmd/auau/8gev/centr_0_10/urqmd.auau.8gev.centr.00007.root\", ",
                "\"/gen/pluto/auau/8gev/phi/phi.auau.8gev_00007.root\", ",
                "\"/data/phi/tra.00007.root\", \"/data/phi/par.00007.root\", ",
                "\"/data/phi/geosim.00007.root\", \"sis100_electron\", 250, 7)"
            )
        );
        assert_eq!(transport.inputs.len(), 2);
    }

    #[test]
    fn oversized_seed_is_rejected_before_planning() {
        let config = RunConfig {
            seed: Some(u64::MAX),
            ..config()
        };
        let error = plan_job(
            &config,
            &JobIdentity::local(2).unwrap(),
            &MacroCatalog::new("/m"),
            &[Stage::Transport],
            Path::new("/w"),
        )
        .unwrap_err();
        assert_eq!(error.placeholder(), "INPUT.SEED");

        let fixed = RunConfig {
            seed: Some(42),
            ..self::config()
        };
        let plan = plan_job(
            &fixed,
            &JobIdentity::local(2).unwrap(),
            &MacroCatalog::new("/m"),
            &[Stage::Transport],
            Path::new("/w"),
        )
        .unwrap();
        assert!(plan.stages[0].process.args[3].ends_with("250, 42)"));
    }

    #[test]
    fn reconstruction_flags_render_as_numerals() {
        let plan = full_plan();
        let reco = &plan.stages[2];
        assert!(reco.process.args[3].ends_with("250, \"sis100_electron\", \"Ideal\", 1, 0)"));
    }

    #[test]
    fn background_only_production_passes_empty_signal() {
        let config = RunConfig {
            particle: Some(Particle::Urqmd),
            ..config()
        };
        let plan = plan_job(
            &config,
            &JobIdentity::local(1).unwrap(),
            &MacroCatalog::new("/m"),
            &[Stage::Transport],
            Path::new("/w"),
        )
        .unwrap();
        assert!(plan.stages[0].process.args[3].contains(".root\", \"\", \"/data/phi/tra.00001.root\""));
        assert_eq!(plan.stages[0].inputs.len(), 1);
    }

    #[test]
    fn empty_and_merge_selections_are_rejected() {
        assert_eq!(select_stages(&[]).unwrap_err().placeholder(), "INPUT.STAGES");
        let error = plan_job(
            &config(),
            &JobIdentity::local(1).unwrap(),
            &MacroCatalog::new("/m"),
            &[Stage::Merge],
            Path::new("/w"),
        )
        .unwrap_err();
        assert!(error.message().contains("merge"));
    }

    #[test]
    fn stage_lists_parse_from_comma_separated_tokens() {
        assert_eq!(
            parse_stage_list("transport, digi,reco,").unwrap(),
            vec![Stage::Transport, Stage::Digitization, Stage::Reconstruction]
        );
        assert!(parse_stage_list("transport,unpack").is_err());
    }

    #[test]
    fn merge_plan_collects_every_task_output() {
        let plan = plan_merge(Path::new("/data"), MergeKind::Qa, 3, Path::new("/data")).unwrap();
        let merge = &plan.stages[0];
        assert_eq!(merge.stage, Stage::Merge);
        assert_eq!(merge.process.program, "hadd");
        assert_eq!(
            merge.process.args,
            vec![
                "-f",
                "/data/qa.merged.root",
                "/data/qa.00001.root",
                "/data/qa.00002.root",
                "/data/qa.00003.root",
            ]
        );
        assert_eq!(merge.inputs[2], task_artifact_path(Path::new("/data"), ArtifactKind::Qa, 3));
        assert!("histos".parse::<MergeKind>().is_err());
        assert!(plan_merge(Path::new("/data"), MergeKind::Analysis, 0, Path::new("/")).is_err());
    }
}
