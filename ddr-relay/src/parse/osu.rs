//! osu! beatmap text (`.osu`)
//!
//! Only circles in `[HitObjects]` become notes; sliders and spinners are
//! dropped. `[General]` and `[Metadata]` are read for the fields the client
//! shows.

use super::Take;
use crate::beatmap::BeatmapError;
use anyhow::{bail, Context, Result};
use ddr_common::core::{Chart, ChartMeta, Note};

/// Bit 0 of the hit object type marks a circle.
const TYPE_CIRCLE: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChart {
    pub notes: Chart,
    pub meta: ChartMeta,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    General,
    Metadata,
    HitObjects,
    Other,
}

impl Section {
    fn from_header(line: &str) -> Self {
        match line {
            "[General]" => Self::General,
            "[Metadata]" => Self::Metadata,
            "[HitObjects]" => Self::HitObjects,
            _ => Self::Other,
        }
    }
}

/// Parse chart text into notes (file order) folded into `lanes` lanes.
pub fn parse_osu(source: &str, lanes: u8) -> Result<ParsedChart, BeatmapError> {
    let mut chart = ParsedChart::default();
    let mut section = Section::None;
    for (index, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with('[') {
            section = Section::from_header(line);
            continue;
        }
        match section {
            Section::HitObjects => {
                if let Some(note) = parse_hit_object(line, lanes)
                    .with_context(|| format!("line {}", index + 1))
                    .map_err(|e| BeatmapError::ChartMalformed(format!("{e:#}")))?
                {
                    chart.notes.push(note);
                }
            }
            Section::General | Section::Metadata => apply_key_value(&mut chart.meta, line),
            _ => {}
        }
    }
    log::debug!(
        "parsed {} notes ({:?})",
        chart.notes.len(),
        chart.meta.title
    );
    Ok(chart)
}

/// `x,y,time,type,hitSound,...`
fn parse_hit_object(line: &str, lanes: u8) -> Result<Option<Note>> {
    let mut it = line.split(',');
    let x = it.take_i32().context("reading x")?;
    it.take_str().context("reading y")?;
    let time = it.take_i64().context("reading time")?;
    let kind = it.take_u32().context("reading type")?;
    if time < 0 {
        bail!("negative time {time}");
    }
    if kind & TYPE_CIRCLE == 0 {
        return Ok(None);
    }
    Ok(Some(Note::new(time as f64 / 1000.0, Note::lane_from_x(x, lanes))))
}

fn apply_key_value(meta: &mut ChartMeta, line: &str) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    let value = Some(value.trim().to_owned());
    match key.trim() {
        "AudioFilename" => meta.audio_filename = value,
        "Title" => meta.title = value,
        "Artist" => meta.artist = value,
        "Version" => meta.version = value,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddr_common::core::LANES;

    const SAMPLE: &str = "osu file format v14

[General]
AudioFilename: audio.mp3
Mode: 0

[Metadata]
Title:Shinseikatsu
Artist:TM
Version:Normal

[TimingPoints]
0,500,4,2,0,100,1,0

[HitObjects]
0,192,500,1,0,0:0:0:0:
256,192,1000,1,0,0:0:0:0:
300,100,1200,2,0,B|350:100,1,50
511,192,1500,5,0,0:0:0:0:
256,192,2000,12,0,3000,0:0:0:0:
130,50,250,1,0,0:0:0:0:
";

    #[test]
    fn test_example_record() {
        let chart = parse_osu("[HitObjects]\n256,192,1000,1,0,0:0:0:0:\n", LANES).unwrap();
        assert_eq!(chart.notes, vec![Note::new(1.0, 2)]);
    }

    #[test]
    fn test_sample_chart() {
        let chart = parse_osu(SAMPLE, LANES).unwrap();
        // slider (type 2) and spinner (type 12) dropped, new-combo circle (5) kept
        assert_eq!(
            chart.notes,
            vec![
                Note::new(0.5, 0),
                Note::new(1.0, 2),
                Note::new(1.5, 3),
                Note::new(0.25, 1),
            ]
        );
        assert_eq!(chart.meta.audio_filename.as_deref(), Some("audio.mp3"));
        assert_eq!(chart.meta.title.as_deref(), Some("Shinseikatsu"));
        assert_eq!(chart.meta.artist.as_deref(), Some("TM"));
        assert_eq!(chart.meta.version.as_deref(), Some("Normal"));
    }

    #[test]
    fn test_notes_in_range() {
        let chart = parse_osu(SAMPLE, 7).unwrap();
        assert!(chart.notes.iter().all(|n| n.lane < 7 && n.time >= 0.0));
        let chart = parse_osu("[HitObjects]\n512,0,0,1\n-3,0,0,1\n", LANES).unwrap();
        assert_eq!(chart.notes, vec![Note::new(0.0, 3), Note::new(0.0, 0)]);
    }

    #[test]
    fn test_idempotent() {
        assert_eq!(
            parse_osu(SAMPLE, LANES).unwrap(),
            parse_osu(SAMPLE, LANES).unwrap()
        );
    }

    #[test]
    fn test_records_outside_hit_objects_ignored() {
        let chart = parse_osu("[Events]\n256,192,1000,1,0\n0,0,\"bg.jpg\",0,0\n", LANES).unwrap();
        assert!(chart.notes.is_empty());
    }

    #[test]
    fn test_malformed_records() {
        for source in [
            "[HitObjects]\nabc,192,1000,1,0\n",
            "[HitObjects]\n256,192,1000\n",
            "[HitObjects]\n256,192,later,1,0\n",
            "[HitObjects]\n256,192,-20,1,0\n",
        ] {
            let err = parse_osu(source, LANES).unwrap_err();
            assert!(
                matches!(err, BeatmapError::ChartMalformed(ref msg) if msg.starts_with("line 2")),
                "{source:?}: {err}"
            );
        }
    }
}
