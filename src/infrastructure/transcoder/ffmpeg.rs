use super::{TranscodeError, Transcoder};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

pub const MASTER_PLAYLIST: &str = "master.m3u8";

// (height, video kbps)
const LADDER: [(u32, u32); 3] = [(360, 800), (720, 2800), (1080, 5000)];

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendition {
    pub height: u32,
    pub video_kbps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    pub height: u32,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    segment_seconds: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: &str, ffprobe_path: &str, segment_seconds: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            ffprobe_path: ffprobe_path.to_string(),
            segment_seconds: segment_seconds.max(1),
        }
    }

    async fn probe(&self, input: &Path) -> Result<ProbeInfo, TranscodeError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_entries", "stream=codec_type,height", "-of", "json"])
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Probe(stderr_tail(&output.stderr)));
        }

        parse_probe(&output.stdout)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), TranscodeError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let probe = self.probe(input).await?;
        let renditions = renditions_for(probe.height);
        info!(
            "🎬 Encoding {} into {} rendition(s) (source {}p, audio: {})",
            input.display(),
            renditions.len(),
            probe.height,
            probe.has_audio
        );

        let args = hls_args(input, output_dir, &probe, &renditions, self.segment_seconds);
        debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(())
    }
}

pub fn parse_probe(json: &[u8]) -> Result<ProbeInfo, TranscodeError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| TranscodeError::Probe(e.to_string()))?;

    let height = parsed
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| s.height)
        .ok_or_else(|| TranscodeError::Probe("no video stream found".to_string()))?;

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(ProbeInfo { height, has_audio })
}

/// Standard heights not above the source, plus the source height itself when
/// it is not one of them. Never upscales.
pub fn renditions_for(source_height: u32) -> Vec<Rendition> {
    let mut renditions: Vec<Rendition> = LADDER
        .iter()
        .filter(|(height, _)| *height <= source_height)
        .map(|&(height, video_kbps)| Rendition { height, video_kbps })
        .collect();

    if !renditions.iter().any(|r| r.height == source_height) {
        renditions.push(Rendition {
            height: source_height,
            video_kbps: bitrate_for(source_height),
        });
    }

    renditions
}

fn bitrate_for(height: u32) -> u32 {
    match height {
        0..=360 => 800,
        361..=720 => 2800,
        721..=1080 => 5000,
        _ => 8000,
    }
}

pub fn hls_args(
    input: &Path,
    output_dir: &Path,
    probe: &ProbeInfo,
    renditions: &[Rendition],
    segment_seconds: u32,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];

    for _ in renditions {
        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        if probe.has_audio {
            args.extend(["-map".to_string(), "0:a:0".to_string()]);
        }
    }

    for (i, r) in renditions.iter().enumerate() {
        args.extend([
            format!("-filter:v:{}", i),
            format!("scale=-2:{}", r.height),
            format!("-c:v:{}", i),
            "libx264".into(),
            format!("-b:v:{}", i),
            format!("{}k", r.video_kbps),
            format!("-maxrate:v:{}", i),
            format!("{}k", r.video_kbps * 6 / 5),
            format!("-bufsize:v:{}", i),
            format!("{}k", r.video_kbps * 2),
        ]);
    }

    if probe.has_audio {
        args.extend(
            ["-c:a", "aac", "-b:a", "128k", "-ac", "2"].map(String::from),
        );
    }

    let stream_map = (0..renditions.len())
        .map(|i| {
            if probe.has_audio {
                format!("v:{},a:{}", i, i)
            } else {
                format!("v:{}", i)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    args.extend([
        "-preset".into(),
        "veryfast".into(),
        "-var_stream_map".into(),
        stream_map,
        "-master_pl_name".into(),
        MASTER_PLAYLIST.into(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        segment_seconds.to_string(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_segment_filename".into(),
        output_dir.join("v%v").join("fileSequence%d.ts").to_string_lossy().into_owned(),
        output_dir.join("v%v").join("prog_index.m3u8").to_string_lossy().into_owned(),
    ]);

    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn ladder_never_upscales() {
        let heights: Vec<u32> = renditions_for(720).iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![360, 720]);

        let heights: Vec<u32> = renditions_for(1440).iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![360, 720, 1080, 1440]);
    }

    #[test]
    fn small_sources_get_a_single_native_rendition() {
        assert_eq!(
            renditions_for(240),
            vec![Rendition { height: 240, video_kbps: 800 }]
        );
    }

    #[test]
    fn odd_source_heights_are_kept_alongside_the_ladder() {
        let renditions = renditions_for(1000);
        assert_eq!(renditions.last(), Some(&Rendition { height: 1000, video_kbps: 5000 }));
        assert_eq!(renditions.len(), 3);
    }

    #[test]
    fn probe_reads_video_height_and_audio_presence() {
        let json = br#"{"streams":[{"codec_type":"audio"},{"codec_type":"video","height":1080}]}"#;
        assert_eq!(
            parse_probe(json).unwrap(),
            ProbeInfo { height: 1080, has_audio: true }
        );

        let silent = br#"{"streams":[{"codec_type":"video","height":480}]}"#;
        assert!(!parse_probe(silent).unwrap().has_audio);
    }

    #[test]
    fn probe_without_video_is_an_error() {
        let json = br#"{"streams":[{"codec_type":"audio"}]}"#;
        assert!(matches!(parse_probe(json), Err(TranscodeError::Probe(_))));
        assert!(matches!(parse_probe(b"not json"), Err(TranscodeError::Probe(_))));
    }

    #[test]
    fn args_map_every_rendition_into_one_master_playlist() {
        let probe = ProbeInfo { height: 720, has_audio: true };
        let renditions = renditions_for(720);
        let args = hls_args(
            Path::new("/stage/abc.mp4"),
            Path::new("/out/abc"),
            &probe,
            &renditions,
            6,
        );

        let value_after = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };

        assert_eq!(value_after("-i"), "/stage/abc.mp4");
        assert_eq!(value_after("-var_stream_map"), "v:0,a:0 v:1,a:1");
        assert_eq!(value_after("-master_pl_name"), MASTER_PLAYLIST);
        assert_eq!(value_after("-hls_time"), "6");
        assert_eq!(value_after("-filter:v:1"), "scale=-2:720");
        assert_eq!(value_after("-b:v:0"), "800k");
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 4);
        assert_eq!(
            PathBuf::from(args.last().unwrap()),
            PathBuf::from("/out/abc/v%v/prog_index.m3u8")
        );
    }

    #[test]
    fn args_skip_audio_when_the_source_is_silent() {
        let probe = ProbeInfo { height: 360, has_audio: false };
        let args = hls_args(
            Path::new("in.mp4"),
            Path::new("out"),
            &probe,
            &renditions_for(360),
            4,
        );

        assert!(!args.iter().any(|a| a == "0:a:0" || a == "-c:a"));
        let pos = args.iter().position(|a| a == "-var_stream_map").unwrap();
        assert_eq!(args[pos + 1], "v:0");
    }

    #[test]
    fn stderr_tail_keeps_the_last_lines() {
        let stderr = (0..50).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }
}
