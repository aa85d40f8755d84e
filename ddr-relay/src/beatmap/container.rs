//! `.osz` container access
//!
//! An `.osz` is a plain zip holding one or more `.osu` charts next to the
//! song audio. Everything here is blocking; callers go through
//! `spawn_blocking`.

use super::BeatmapError;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

pub const CHART_EXTENSION: &str = "osu";
pub const AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "ogg", "wav"];
pub const CONTAINER_EXTENSION: &str = "osz";

#[derive(Debug, Clone)]
pub struct DecodedBeatmap {
    pub chart_text: String,
    pub audio_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    /// Location of the extracted file in the scratch directory
    pub path: PathBuf,
    /// Entry name inside the container
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerEntry {
    pub name: String,
    pub path: String,
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| ext.eq_ignore_ascii_case(x)))
}

fn open(path: &Path) -> Result<ZipArchive<File>, BeatmapError> {
    let file = File::open(path).map_err(|source| BeatmapError::ContainerNotFound {
        path: path.to_owned(),
        source,
    })?;
    ZipArchive::new(file).map_err(|source| BeatmapError::ContainerUnreadable {
        path: path.to_owned(),
        source,
    })
}

/// First chart entry and first audio entry, in archive order.
fn scan(zip: &ZipArchive<File>) -> (Option<String>, Option<String>) {
    let mut chart = None;
    let mut audio = None;
    for name in zip.file_names() {
        if chart.is_none() && has_extension(name, &[CHART_EXTENSION]) {
            chart = Some(name.to_owned());
        } else if audio.is_none() && has_extension(name, &AUDIO_EXTENSIONS) {
            audio = Some(name.to_owned());
        }
    }
    (chart, audio)
}

pub fn decode(path: &Path) -> Result<DecodedBeatmap, BeatmapError> {
    let mut zip = open(path)?;
    let (chart_name, audio_name) = scan(&zip);
    let chart_name = chart_name.ok_or_else(|| BeatmapError::ChartMissing {
        path: path.to_owned(),
    })?;

    let mut bytes = Vec::new();
    zip.by_name(&chart_name)
        .map_err(|source| BeatmapError::ContainerUnreadable {
            path: path.to_owned(),
            source,
        })?
        .read_to_end(&mut bytes)?;
    let chart_text = String::from_utf8(bytes)
        .map_err(|e| BeatmapError::ChartMalformed(format!("{chart_name}: {e}")))?;

    log::debug!("decoded {chart_name} from {path:?} (audio: {audio_name:?})");
    Ok(DecodedBeatmap {
        chart_text,
        audio_name,
    })
}

/// Cache record kept next to extracted audio. Its file doubles as the lock.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct ExtractMeta {
    entry: String,
    crc32: u32,
    size: u64,
}

const META_NAME: &str = "extract.meta";

/// Scratch subdirectory for one container: `<stem>-<hash of canonical path>`.
fn scratch_key(path: &Path) -> io::Result<String> {
    let canonical = fs::canonicalize(path)?;
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "beatmap".to_owned());
    Ok(format!("{stem}-{}", &hash.to_hex()[..16]))
}

/// Extract the audio entry into the container's scratch directory.
///
/// Extraction is serialised by an exclusive lock on the directory's meta
/// file. A previous extraction is reused when the entry name, CRC and size
/// recorded there still match the container.
pub fn extract_audio(path: &Path, scratch_dir: &Path) -> Result<ExtractedAudio, BeatmapError> {
    let mut zip = open(path)?;
    let missing = || BeatmapError::AudioMissing {
        path: path.to_owned(),
    };
    let (_, name) = scan(&zip);
    let name = name.ok_or_else(missing)?;

    let mut entry = zip
        .by_name(&name)
        .map_err(|source| BeatmapError::ContainerUnreadable {
            path: path.to_owned(),
            source,
        })?;
    // rejects absolute names and `..` components
    let relative = entry.enclosed_name().ok_or_else(missing)?;
    let dir = scratch_dir.join(scratch_key(path)?);
    let dest = dir.join(relative);
    let meta = ExtractMeta {
        entry: name.clone(),
        crc32: entry.crc32(),
        size: entry.size(),
    };

    fs::create_dir_all(&dir)?;
    let mut meta_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(META_NAME))?;
    meta_file.lock_exclusive()?;

    let cached = serde_json::from_reader::<_, ExtractMeta>(&meta_file).ok();
    if cached.as_ref() == Some(&meta) && dest.is_file() {
        log::debug!("audio {dest:?} already extracted");
        return Ok(ExtractedAudio { path: dest, name });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = dest.with_extension("part");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        io::copy(&mut entry, &mut writer)?;
        writer.into_inner().map_err(|e| e.into_error())?;
    }
    fs::rename(&tmp, &dest)?;

    meta_file.set_len(0)?;
    meta_file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut meta_file, &meta).map_err(io::Error::from)?;
    log::info!("extracted {name} to {dest:?}");

    // lock released when meta_file is dropped
    Ok(ExtractedAudio { path: dest, name })
}

/// `.osz` files directly inside `dir`, sorted by name. A missing directory
/// has no containers.
pub fn list_containers(dir: &Path) -> io::Result<Vec<ContainerEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("beatmap directory {dir:?} does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let mut list = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_container = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| has_extension(n, &[CONTAINER_EXTENSION]));
        if !is_container || !path.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        list.push(ContainerEntry {
            name,
            path: path.to_string_lossy().into_owned(),
        });
    }
    list.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(list)
}
