//! Persistence of signing material produced by successful runs.

use crate::tbls::TBlsError;
use crate::tbls::ThresholdSigner;
use crate::traits::Scheme;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

const TMP_SUFFIX: &str = ".tmp";

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("signer {name} in {directory}: {source}")]
    Signer {
        directory: String,
        name: String,
        source: TBlsError,
    },
}

/// One stored item as returned by [`Persistence::read_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub directory: String,
    pub name: String,
    pub content: Vec<u8>,
}

/// Storage of opaque blobs grouped in directories.
pub trait Persistence {
    fn save(&self, data: &[u8], directory: &str, name: &str) -> Result<(), RegistryError>;

    /// Reads back everything saved so far. Used once at startup.
    fn read_all(&self) -> Result<Vec<Descriptor>, RegistryError>;
}

/// [`Persistence`] on the local filesystem, one file per item.
pub struct DiskPersistence {
    root: PathBuf,
}

impl DiskPersistence {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self { root })
    }
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.ends_with(TMP_SUFFIX)
        || name.contains(['/', '\\']);
    if invalid {
        return Err(RegistryError::InvalidName(name.to_owned()));
    }
    Ok(())
}

impl Persistence for DiskPersistence {
    fn save(&self, data: &[u8], directory: &str, name: &str) -> Result<(), RegistryError> {
        check_name(directory)?;
        check_name(name)?;

        let dir = self.root.join(directory);
        fs::create_dir_all(&dir)?;

        // write then rename, a crash never leaves a partial item behind
        let tmp = dir.join(format!("{name}{TMP_SUFFIX}"));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, dir.join(name))?;

        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Descriptor>, RegistryError> {
        let mut out = vec![];
        for dir in fs::read_dir(&self.root)? {
            let dir = dir?;
            if !dir.file_type()?.is_dir() {
                continue;
            }
            let directory = dir.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(dir.path())? {
                let file = file?;
                let name = file.file_name().to_string_lossy().into_owned();
                if !file.file_type()?.is_file() || name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                out.push(Descriptor {
                    directory: directory.clone(),
                    name,
                    content: fs::read(file.path())?,
                });
            }
        }
        // directory listing order is platform dependent
        out.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));

        Ok(out)
    }
}

/// Signers of this node keyed by group public key.
pub struct SignerRegistry<S: Scheme, P: Persistence> {
    signers: BTreeMap<Vec<u8>, Vec<ThresholdSigner<S>>>,
    persistence: P,
}

impl<S: Scheme, P: Persistence> SignerRegistry<S, P> {
    /// Repopulates the registry from everything previously saved.
    pub fn load(persistence: P) -> Result<Self, RegistryError> {
        let mut signers: BTreeMap<Vec<u8>, Vec<ThresholdSigner<S>>> = BTreeMap::new();

        for item in persistence.read_all()? {
            let signer = ThresholdSigner::<S>::from_bytes(&item.content).map_err(|source| {
                RegistryError::Signer {
                    directory: item.directory.clone(),
                    name: item.name.clone(),
                    source,
                }
            })?;
            let key = signer.group_public_key_bytes();
            if hex::encode(&key) != item.directory {
                warn!("signer {} stored under foreign directory {}", item.name, item.directory);
            }
            signers.entry(key).or_default().push(signer);
        }
        info!("loaded signers for {} groups", signers.len());

        Ok(Self {
            signers,
            persistence,
        })
    }

    /// Persists the signer and keeps it in memory.
    pub fn register(&mut self, signer: ThresholdSigner<S>) -> Result<(), RegistryError> {
        let key = signer.group_public_key_bytes();
        let directory = hex::encode(&key);
        let name = format!("membership_{}", signer.member_index());
        self.persistence.save(&signer.to_bytes(), &directory, &name)?;

        let members = self.signers.entry(key).or_default();
        members.retain(|s| s.member_index() != signer.member_index());
        members.push(signer);

        Ok(())
    }

    pub fn signers(&self, group_public_key: &[u8]) -> &[ThresholdSigner<S>] {
        self.signers
            .get(group_public_key)
            .map(|s| s.as_slice())
            .unwrap_or_default()
    }

    pub fn groups(&self) -> impl Iterator<Item = &[u8]> {
        self.signers.keys().map(|k| k.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PriPoly;
    use crate::schemes::DefaultScheme;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    type S = DefaultScheme;

    fn signers(n: u32, seed: u8) -> Vec<ThresholdSigner<S>> {
        let mut rng = ChaChaRng::from_seed([seed; 32]);
        let poly = PriPoly::<S>::new(1, &mut rng);
        let gpk = S::sk_to_pk(poly.secret());

        (1..=n)
            .map(|i| ThresholdSigner::new(i, gpk.clone(), poly.eval(i).v))
            .collect()
    }

    #[test]
    fn disk_persistence_reads_back_everything() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskPersistence::new(dir.path()).unwrap();
        disk.save(b"one", "b", "x").unwrap();
        disk.save(b"two", "a", "y").unwrap();
        disk.save(b"three", "a", "y").unwrap();

        let all = disk.read_all().unwrap();
        assert_eq!(
            all,
            vec![
                Descriptor {
                    directory: "a".into(),
                    name: "y".into(),
                    content: b"three".to_vec()
                },
                Descriptor {
                    directory: "b".into(),
                    name: "x".into(),
                    content: b"one".to_vec()
                },
            ]
        );
        assert!(matches!(
            disk.save(b"", "a", "../escape"),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn registry_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let group_a = signers(3, 51);
        let group_b = signers(3, 52);
        let key_a = group_a[0].group_public_key_bytes();
        let key_b = group_b[0].group_public_key_bytes();

        {
            let disk = DiskPersistence::new(dir.path()).unwrap();
            let mut registry = SignerRegistry::<S, _>::load(disk).unwrap();
            for signer in group_a.into_iter().take(2) {
                registry.register(signer).unwrap();
            }
            for signer in group_b.into_iter().skip(2) {
                registry.register(signer).unwrap();
            }
            assert_eq!(registry.signers(&key_a).len(), 2);
        }

        let disk = DiskPersistence::new(dir.path()).unwrap();
        let registry = SignerRegistry::<S, _>::load(disk).unwrap();
        assert_eq!(registry.groups().count(), 2);

        let mut indices: Vec<u32> = registry
            .signers(&key_a)
            .iter()
            .map(|s| s.member_index())
            .collect();
        indices.sort();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(registry.signers(&key_b)[0].member_index(), 3);
        assert!(registry.signers(&[0u8; 48]).is_empty());
    }

    #[test]
    fn corrupted_signer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskPersistence::new(dir.path()).unwrap();
        disk.save(b"garbage", "00", "membership_1").unwrap();

        assert!(matches!(
            SignerRegistry::<S, _>::load(disk),
            Err(RegistryError::Signer { .. })
        ));
    }
}
