//! Container fixtures for tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

pub const SAMPLE_OSU: &str = "osu file format v14

[General]
AudioFilename: audio.mp3

[Metadata]
Title:Shinseikatsu
Artist:TM
Version:Easy

[HitObjects]
256,192,1000,1,0,0:0:0:0:
64,192,2000,1,0,0:0:0:0:
448,192,2500,2,0,B|480:160,1,40
448,192,3000,1,0,0:0:0:0:
";

/// Write a zip named `name` into `dir` holding `entries` in order.
pub fn write_osz(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (entry, data) in entries {
        zip.start_file(*entry, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
    path
}
