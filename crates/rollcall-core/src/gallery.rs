//! Enrolled identities and nearest-match lookup.
//!
//! Enrollment photos are persisted under `<root>/<name>/<seq>.<ext>` and
//! listed in `<root>/index.json` in enrollment order, so the gallery can be
//! rebuilt by re-encoding every photo. Flat `<root>/<name>.jpg|png` files
//! are also picked up on reload.
//!
//! Readers never block on a rebuild: the identity set is an immutable
//! `Arc` snapshot that writers replace wholesale.

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::types::{Descriptor, Identity, MatchPolicy, MatchResult, Matcher, NearestMatcher};
use image::{ImageError, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

const INDEX_FILE: &str = "index.json";
const MAX_NAME_LEN: usize = 64;
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no face found in enrollment image")]
    NoFaceFound,
    #[error("enrollment image contains {0} faces, expected exactly one")]
    AmbiguousFace(usize),
    #[error("invalid learner name: {0:?}")]
    InvalidName(String),
    #[error("enrollment image could not be decoded: {0}")]
    Decode(#[from] ImageError),
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("gallery I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gallery index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
}

/// Failure rebuilding the gallery from persisted photos.
pub type LoadError = StoreError;

/// How a new enrollment photo combines with existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollMode {
    /// Add a descriptor alongside earlier photos.
    #[default]
    Append,
    /// Discard earlier photos of this identity.
    Replace,
}

/// Listing entry for one enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub descriptors: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GalleryIndex {
    identities: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    name: String,
    /// Paths relative to the gallery root.
    images: Vec<PathBuf>,
}

impl GalleryIndex {
    fn load(root: &Path) -> Result<Self, StoreError> {
        match fs::read(root.join(INDEX_FILE)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, root: &Path) -> Result<(), StoreError> {
        // Learner names never start with '.'.
        let tmp = root.join(format!(".{INDEX_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, root.join(INDEX_FILE))?;
        Ok(())
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut IndexEntry> {
        self.identities.iter_mut().find(|e| e.name == name)
    }
}

pub struct GalleryStore {
    root: PathBuf,
    policy: MatchPolicy,
    /// Serializes enroll/reload/remove.
    writer: Mutex<()>,
    current: RwLock<Arc<Vec<Identity>>>,
}

impl GalleryStore {
    /// Open (creating if needed) the photo directory. The identity set starts
    /// empty; call [`reload`](Self::reload) to encode persisted photos.
    pub fn open(root: impl Into<PathBuf>, policy: MatchPolicy) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            policy,
            writer: Mutex::new(()),
            current: RwLock::new(Arc::new(Vec::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Immutable view of the identity set, in enrollment order.
    pub fn snapshot(&self) -> Arc<Vec<Identity>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn known_names(&self) -> Vec<String> {
        self.snapshot().iter().map(|i| i.name.clone()).collect()
    }

    pub fn identities(&self) -> Vec<IdentitySummary> {
        self.snapshot()
            .iter()
            .map(|i| IdentitySummary {
                name: i.name.clone(),
                descriptors: i.descriptors.len(),
            })
            .collect()
    }

    /// Nearest enrolled identity within `threshold`.
    pub fn best_match(&self, descriptor: &Descriptor, threshold: f32) -> MatchResult {
        let policy = MatchPolicy { threshold, ..self.policy };
        NearestMatcher.compare(descriptor, &self.snapshot(), &policy)
    }

    /// [`best_match`](Self::best_match) with the configured threshold.
    pub fn match_descriptor(&self, descriptor: &Descriptor) -> MatchResult {
        NearestMatcher.compare(descriptor, &self.snapshot(), &self.policy)
    }

    /// Enroll one photo under `name`.
    ///
    /// The photo must contain exactly one face. On any error the gallery,
    /// both in memory and on disk, is left unchanged.
    pub fn enroll(
        &self,
        analyzer: &mut Analyzer,
        name: &str,
        photo: &[u8],
        mode: EnrollMode,
    ) -> Result<(), EnrollError> {
        validate_name(name)?;
        let format = image::guess_format(photo)?;
        let image = image::load_from_memory_with_format(photo, format)?.to_rgb8();
        let descriptor = single_face_descriptor(analyzer, &image)?;

        let (bytes, extension) = match format {
            ImageFormat::Jpeg => (Cow::Borrowed(photo), "jpg"),
            ImageFormat::Png => (Cow::Borrowed(photo), "png"),
            _ => (Cow::Owned(encode_png(&image)?), "png"),
        };

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist_photo(name, &bytes, extension, mode)?;

        let mut identities = (*self.snapshot()).clone();
        match identities.iter_mut().find(|i| i.name == name) {
            Some(identity) if mode == EnrollMode::Replace => identity.descriptors = vec![descriptor],
            Some(identity) => identity.descriptors.push(descriptor),
            None => identities.push(Identity {
                name: name.to_string(),
                descriptors: vec![descriptor],
            }),
        }
        self.swap(identities);

        tracing::info!(name, ?mode, "learner enrolled");
        Ok(())
    }

    /// Rebuild the identity set by re-encoding every persisted photo.
    ///
    /// Unreadable photos and photos without exactly one face are skipped
    /// with a warning. Returns the number of identities loaded.
    pub fn reload(&self, analyzer: &mut Analyzer) -> Result<usize, LoadError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let sources = self.collect_sources()?;
        let mut identities = Vec::with_capacity(sources.len());
        let mut skipped = 0usize;

        for (name, paths) in sources {
            let mut descriptors = Vec::with_capacity(paths.len());
            for path in paths {
                match encode_photo(analyzer, &path) {
                    Ok(descriptor) => descriptors.push(descriptor),
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!(name, path = %path.display(), error = %e, "skipping gallery photo");
                    }
                }
            }
            if descriptors.is_empty() {
                tracing::warn!(name, "no usable photos; identity not loaded");
                continue;
            }
            identities.push(Identity { name, descriptors });
        }

        let loaded = identities.len();
        self.swap(identities);
        tracing::info!(loaded, skipped, root = %self.root.display(), "gallery reloaded");
        Ok(loaded)
    }

    /// Delete an identity and its photos. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut index = GalleryIndex::load(&self.root)?;
        let before = index.identities.len();
        index.identities.retain(|e| e.name != name);
        let mut existed = index.identities.len() != before;
        if existed {
            index.save(&self.root)?;
        }

        // Only touch paths that stay inside the root.
        if validate_name(name).is_ok() {
            let dir = self.root.join(name);
            if dir.is_dir() {
                fs::remove_dir_all(&dir)?;
                existed = true;
            }
            for ext in IMAGE_EXTENSIONS {
                let flat = self.root.join(format!("{name}.{ext}"));
                if flat.is_file() {
                    fs::remove_file(&flat)?;
                    existed = true;
                }
            }
        }

        let mut identities = (*self.snapshot()).clone();
        let in_memory = identities.len();
        identities.retain(|i| i.name != name);
        existed |= identities.len() != in_memory;
        self.swap(identities);

        if existed {
            tracing::info!(name, "learner removed");
        }
        Ok(existed)
    }

    /// Write the photo and index entry, then drop replaced photos.
    ///
    /// If the photo or the index cannot be written, the new photo is removed
    /// again and the index is left as it was.
    fn persist_photo(&self, name: &str, bytes: &[u8], extension: &str, mode: EnrollMode) -> Result<(), StoreError> {
        let mut index = GalleryIndex::load(&self.root)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)?;
        let relative = PathBuf::from(name).join(format!("{:04}.{extension}", next_sequence(&dir)?));
        let written = self.root.join(&relative);

        let replaced = match index.entry_mut(name) {
            Some(entry) if mode == EnrollMode::Replace => std::mem::replace(&mut entry.images, vec![relative]),
            Some(entry) => {
                entry.images.push(relative);
                Vec::new()
            }
            None => {
                index.identities.push(IndexEntry {
                    name: name.to_string(),
                    images: vec![relative],
                });
                Vec::new()
            }
        };
        let saved = fs::write(&written, bytes)
            .map_err(StoreError::from)
            .and_then(|()| index.save(&self.root));
        if let Err(e) = saved {
            let _ = fs::remove_file(&written);
            // Only succeeds if this enrollment created the directory.
            let _ = fs::remove_dir(&dir);
            return Err(e);
        }

        if mode == EnrollMode::Replace {
            let mut stale: Vec<PathBuf> = replaced.iter().map(|p| self.root.join(p)).collect();
            match self.unindexed_photos(name, &written) {
                Ok(photos) => stale.extend(photos),
                Err(e) => tracing::warn!(name, error = %e, "could not scan for replaced photos"),
            }
            for path in stale {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to delete replaced photo"),
                }
            }
        }
        Ok(())
    }

    /// Every other photo `reload` would attribute to `name`: files in its
    /// directory and flat `<name>.<ext>` files at the root.
    fn unindexed_photos(&self, name: &str, keep: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let mut photos = Vec::new();
        for entry in fs::read_dir(self.root.join(name))? {
            let path = entry?.path();
            if is_photo(&path) && path != keep {
                photos.push(path);
            }
        }
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if is_photo(&path) && path.file_stem().and_then(|s| s.to_str()) == Some(name) {
                photos.push(path);
            }
        }
        Ok(photos)
    }

    fn swap(&self, identities: Vec<Identity>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(identities);
    }

    /// Photo paths per identity: indexed identities in enrollment order, then
    /// unindexed photos grouped by name in name order.
    fn collect_sources(&self) -> Result<Vec<(String, Vec<PathBuf>)>, StoreError> {
        let index = GalleryIndex::load(&self.root)?;
        let mut sources: Vec<(String, Vec<PathBuf>)> = index
            .identities
            .iter()
            .map(|e| (e.name.clone(), e.images.iter().map(|p| self.root.join(p)).collect()))
            .collect();

        let mut indexed: Vec<PathBuf> = sources.iter().flat_map(|(_, paths)| paths.clone()).collect();
        indexed.sort();

        let mut extras: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .filter(|n| validate_name(n).is_ok())
                    .map(str::to_string)
                else {
                    continue;
                };
                for photo in fs::read_dir(&path)? {
                    let photo = photo?.path();
                    if is_photo(&photo) && indexed.binary_search(&photo).is_err() {
                        extras.entry(name.clone()).or_default().push(photo);
                    }
                }
            } else if is_photo(&path) && indexed.binary_search(&path).is_err() {
                let name = path.file_stem().and_then(|n| n.to_str());
                if let Some(name) = name.filter(|n| validate_name(n).is_ok()) {
                    extras.entry(name.to_string()).or_default().push(path.clone());
                }
            }
        }

        for (name, mut paths) in extras {
            paths.sort();
            match sources.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => existing.extend(paths),
                None => sources.push((name, paths)),
            }
        }
        Ok(sources)
    }
}

/// Names double as directory names next to the index file.
fn validate_name(name: &str) -> Result<(), EnrollError> {
    let valid = !name.trim().is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && !name.eq_ignore_ascii_case(INDEX_FILE)
        && !name.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if valid {
        Ok(())
    } else {
        Err(EnrollError::InvalidName(name.to_string()))
    }
}

fn single_face_descriptor(analyzer: &mut Analyzer, image: &RgbImage) -> Result<Descriptor, EnrollError> {
    let faces = analyzer.detect(image)?;
    match faces.as_slice() {
        [] => Err(EnrollError::NoFaceFound),
        [face] => Ok(analyzer.encode(image, face)?),
        many => Err(EnrollError::AmbiguousFace(many.len())),
    }
}

fn encode_photo(analyzer: &mut Analyzer, path: &Path) -> Result<Descriptor, EnrollError> {
    let bytes = fs::read(path).map_err(StoreError::from)?;
    let image = image::load_from_memory(&bytes)?.to_rgb8();
    single_face_descriptor(analyzer, &image)
}

fn is_photo(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// One past the highest numeric file stem in `dir`.
fn next_sequence(dir: &Path) -> Result<u32, StoreError> {
    let mut highest = 0u32;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        {
            highest = highest.max(seq);
        }
    }
    Ok(highest + 1)
}
