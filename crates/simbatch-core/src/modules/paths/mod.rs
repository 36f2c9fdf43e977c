mod artifacts;
mod category;

pub use artifacts::{ArtifactKind, FileSet, task_artifact_path};
pub use category::{CollisionEnergy, CollisionSystem, InputConvention, Particle};

use std::path::PathBuf;

/// Roots of the pre-generated event stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorRoots {
    pub pluto_root: PathBuf,
    pub urqmd_root: PathBuf,
}

impl GeneratorRoots {
    pub fn new(pluto_root: impl Into<PathBuf>, urqmd_root: impl Into<PathBuf>) -> Self {
        Self {
            pluto_root: pluto_root.into(),
            urqmd_root: urqmd_root.into(),
        }
    }
}

pub fn zero_padded(index: u32, width: usize) -> String {
    format!("{index:0width$}")
}

/// Signal generator file for one task, or `None` when the selector has no
/// distinct signal input.
pub fn signal_input_path(
    roots: &GeneratorRoots,
    convention: InputConvention,
    system: CollisionSystem,
    energy: CollisionEnergy,
    particle: Particle,
    index: u32,
) -> Option<PathBuf> {
    if !particle.has_signal_input() {
        return None;
    }

    let padded = zero_padded(index, convention.index_width());
    let path = match convention {
        InputConvention::Legacy => roots
            .pluto_root
            .join(system.key())
            .join("cktA")
            .join(energy.key())
            .join(particle.key())
            .join("epem")
            .join(format!(
                "pluto.{}.{}.centr.{}.epem.{}.root",
                system, energy, particle, padded
            )),
        InputConvention::New => roots
            .pluto_root
            .join(system.key())
            .join(energy.key())
            .join(particle.key())
            .join(format!("{}.{}.{}_{}.root", particle, system, energy, padded)),
    };
    Some(path)
}

pub fn background_input_path(
    roots: &GeneratorRoots,
    system: CollisionSystem,
    energy: CollisionEnergy,
    index: u32,
) -> PathBuf {
    roots
        .urqmd_root
        .join(system.key())
        .join(energy.key())
        .join("centr_0_10")
        .join(format!(
            "urqmd.{}.{}.centr.{}.root",
            system,
            energy,
            zero_padded(index, 5)
        ))
}

#[cfg(test)]
mod tests {
    use super::{
        CollisionEnergy, CollisionSystem, GeneratorRoots, InputConvention, Particle,
        background_input_path, signal_input_path,
    };
    use std::collections::HashSet;

    fn roots() -> GeneratorRoots {
        GeneratorRoots::new("/lustre/gen/pluto", "/lustre/gen/urqmd")
    }

    #[test]
    fn phi_new_convention_uses_five_digit_index() {
        let path = signal_input_path(
            &roots(),
            InputConvention::New,
            CollisionSystem::AuAu,
            CollisionEnergy::Gev8,
            Particle::Phi,
            7,
        )
        .expect("phi has a signal input");
        let rendered = path.to_string_lossy();
        assert!(rendered.ends_with("_00007.root"), "got {}", rendered);
        assert_eq!(
            rendered,
            "/lustre/gen/pluto/auau/8gev/phi/phi.auau.8gev_00007.root"
        );
    }

    #[test]
    fn legacy_convention_uses_four_digit_index() {
        let path = signal_input_path(
            &roots(),
            InputConvention::Legacy,
            CollisionSystem::AuAu,
            CollisionEnergy::Gev3_5,
            Particle::InMed,
            42,
        )
        .unwrap();
        assert_eq!(
            path.to_string_lossy(),
            "/lustre/gen/pluto/auau/cktA/3.5gev/inmed/epem/pluto.auau.3.5gev.centr.inmed.epem.0042.root"
        );
    }

    #[test]
    fn every_signal_category_yields_a_padded_path() {
        for convention in [InputConvention::Legacy, InputConvention::New] {
            for particle in Particle::ALL.iter().copied().filter(|p| p.has_signal_input()) {
                let path = signal_input_path(
                    &roots(),
                    convention,
                    CollisionSystem::AgAg,
                    CollisionEnergy::Gev4_5,
                    particle,
                    12,
                )
                .unwrap();
                let padded = format!("{:0width$}", 12, width = convention.index_width());
                let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
                assert!(file_name.contains(&padded), "{} lacks {}", file_name, padded);
                assert!(file_name.contains(particle.key()));
            }
        }
    }

    #[test]
    fn background_only_selector_has_no_signal_input() {
        let path = signal_input_path(
            &roots(),
            InputConvention::New,
            CollisionSystem::AuAu,
            CollisionEnergy::Gev8,
            Particle::Urqmd,
            1,
        );
        assert!(path.is_none());
    }

    #[test]
    fn paths_are_unique_and_deterministic_across_indices() {
        let mut seen = HashSet::new();
        for index in 1..=500 {
            let first = signal_input_path(
                &roots(),
                InputConvention::New,
                CollisionSystem::AuAu,
                CollisionEnergy::Gev8,
                Particle::OmegaEpem,
                index,
            );
            let second = signal_input_path(
                &roots(),
                InputConvention::New,
                CollisionSystem::AuAu,
                CollisionEnergy::Gev8,
                Particle::OmegaEpem,
                index,
            );
            assert_eq!(first, second);
            assert!(seen.insert(first.unwrap()), "index {} collided", index);
        }
    }

    #[test]
    fn background_path_is_padded_to_five_digits() {
        let path = background_input_path(&roots(), CollisionSystem::NiNi, CollisionEnergy::Gev12, 3);
        assert_eq!(
            path.to_string_lossy(),
            "/lustre/gen/urqmd/nini/12gev/centr_0_10/urqmd.nini.12gev.centr.00003.root"
        );
    }
}
