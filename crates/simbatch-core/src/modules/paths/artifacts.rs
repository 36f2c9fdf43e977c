use super::zero_padded;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const TASK_INDEX_WIDTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Transport,
    Parameters,
    GeoSim,
    Digi,
    Reco,
    Qa,
    Analysis,
}

impl ArtifactKind {
    pub const fn stem(self) -> &'static str {
        match self {
            Self::Transport => "tra",
            Self::Parameters => "par",
            Self::GeoSim => "geosim",
            Self::Digi => "digi",
            Self::Reco => "reco",
            Self::Qa => "qa",
            Self::Analysis => "analysis",
        }
    }

    pub const fn extension(self) -> &'static str {
        "root"
    }
}

/// `<data_dir>/<stem>.<index:05>.<ext>`
pub fn task_artifact_path(data_dir: &Path, kind: ArtifactKind, index: u32) -> PathBuf {
    data_dir.join(format!(
        "{}.{}.{}",
        kind.stem(),
        zero_padded(index, TASK_INDEX_WIDTH),
        kind.extension()
    ))
}

/// Every stage artifact of one task. Downstream stages read the same fields
/// upstream stages write, so a reader's input path is always the writer's
/// output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSet {
    pub index: u32,
    pub transport: PathBuf,
    pub parameters: PathBuf,
    pub geo_sim: PathBuf,
    pub digi: PathBuf,
    pub reco: PathBuf,
    pub qa: PathBuf,
    pub analysis: PathBuf,
}

impl FileSet {
    pub fn for_task(data_dir: &Path, index: u32) -> Self {
        let path = |kind| task_artifact_path(data_dir, kind, index);
        Self {
            index,
            transport: path(ArtifactKind::Transport),
            parameters: path(ArtifactKind::Parameters),
            geo_sim: path(ArtifactKind::GeoSim),
            digi: path(ArtifactKind::Digi),
            reco: path(ArtifactKind::Reco),
            qa: path(ArtifactKind::Qa),
            analysis: path(ArtifactKind::Analysis),
        }
    }

    pub fn get(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Transport => &self.transport,
            ArtifactKind::Parameters => &self.parameters,
            ArtifactKind::GeoSim => &self.geo_sim,
            ArtifactKind::Digi => &self.digi,
            ArtifactKind::Reco => &self.reco,
            ArtifactKind::Qa => &self.qa,
            ArtifactKind::Analysis => &self.analysis,
        }
    }
}
