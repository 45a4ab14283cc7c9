//! ffmpeg-backed capture.
//!
//! Decoding runs in an `ffmpeg` child process writing raw `rgb24` frames to
//! its stdout. Files keep their native resolution (probed with `ffprobe`);
//! devices are asked for the configured resolution and scaled to it, so the
//! frame size is known up front even if the device ignores the request.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use frame_enhance_common::config::SourceConfig;
use frame_enhance_common::frame::{FrameImage, Layout, TimestampedFrame};
use frame_enhance_common::selector::SourceSelector;
use tracing::{debug, info, warn};

use super::{FrameSource, SourceError};

#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Requested device resolution.
    pub width: u32,
    pub height: u32,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

impl From<&SourceConfig> for FfmpegSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
            width: config.width,
            height: config.height,
        }
    }
}

/// What ffmpeg reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Device(String),
    File(String),
}

pub struct FfmpegSource {
    selector: SourceSelector,
    input: Input,
    ffmpeg: String,
    width: u32,
    height: u32,
    process: Option<(Child, ChildStdout)>,
    buffer: Vec<u8>,
    seq: u64,
}

impl FfmpegSource {
    pub fn open(selector: SourceSelector, settings: &FfmpegSettings) -> Result<Self, SourceError> {
        let (input, width, height) = match &selector {
            SourceSelector::Device(index) => {
                let path = format!("/dev/video{index}");
                if !Path::new(&path).exists() {
                    return Err(SourceError::unavailable(&selector, format!("{path} does not exist")));
                }
                (Input::Device(path), settings.width, settings.height)
            }
            SourceSelector::Path(path) => {
                if !Path::new(path).is_file() {
                    return Err(SourceError::unavailable(&selector, "no such file"));
                }
                let (width, height) = probe_dimensions(&settings.ffprobe, path)
                    .map_err(|reason| SourceError::unavailable(&selector, reason))?;
                (Input::File(path.clone()), width, height)
            }
        };

        let source = Self::start(selector, input, width, height, &settings.ffmpeg)?;
        info!(
            selector = %source.selector,
            width,
            height,
            "ffmpeg source opened"
        );
        Ok(source)
    }

    fn start(
        selector: SourceSelector,
        input: Input,
        width: u32,
        height: u32,
        ffmpeg: &str,
    ) -> Result<Self, SourceError> {
        let mut source = Self {
            selector,
            input,
            ffmpeg: ffmpeg.to_string(),
            width,
            height,
            process: None,
            buffer: vec![0u8; width as usize * height as usize * 3],
            seq: 0,
        };
        source.spawn()?;
        Ok(source)
    }

    fn spawn(&mut self) -> Result<(), SourceError> {
        let mut child = Command::new(&self.ffmpeg)
            .args(decode_args(&self.input, self.width, self.height))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SourceError::unavailable(&self.selector, format!("failed to spawn ffmpeg: {e}"))
            })?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::unavailable(
                    &self.selector,
                    "could not get ffmpeg stdout handle",
                ));
            }
        };
        self.process = Some((child, stdout));
        Ok(())
    }

    fn stop_process(&mut self) {
        if let Some((mut child, stdout)) = self.process.take() {
            drop(stdout);
            if let Err(e) = child.kill() {
                if e.kind() != ErrorKind::InvalidInput {
                    warn!(error = %e, selector = %self.selector, "failed to kill ffmpeg");
                }
            }
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<TimestampedFrame, SourceError> {
        let Some((_, stdout)) = self.process.as_mut() else {
            return Err(SourceError::Released);
        };
        match stdout.read_exact(&mut self.buffer) {
            Ok(()) => {
                let image =
                    FrameImage::from_raw(Layout::Rgb, self.width, self.height, self.buffer.clone())
                        .map_err(|e| SourceError::Read(e.to_string()))?;
                let frame = TimestampedFrame::now(image, self.seq);
                self.seq += 1;
                Ok(frame)
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => match self.input {
                Input::File(_) => Err(SourceError::EndOfStream),
                Input::Device(_) => Err(SourceError::Read("capture device stopped".into())),
            },
            Err(e) => Err(SourceError::Read(e.to_string())),
        }
    }

    /// Restart decoding from the first frame.
    fn rewind(&mut self) -> Result<(), SourceError> {
        if matches!(self.input, Input::Device(_)) {
            return Err(SourceError::Unsupported("rewind"));
        }
        if self.process.is_none() {
            return Err(SourceError::Released);
        }
        self.stop_process();
        self.spawn()?;
        debug!(selector = %self.selector, "ffmpeg source rewound");
        Ok(())
    }

    fn release(&mut self) {
        if self.process.is_some() {
            self.stop_process();
            info!(selector = %self.selector, "ffmpeg source released");
        }
    }

    fn selector(&self) -> &SourceSelector {
        &self.selector
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn decode_args(input: &Input, width: u32, height: u32) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    match input {
        Input::Device(path) => {
            args.extend(["-f", "v4l2", "-video_size"].map(String::from));
            args.push(format!("{width}x{height}"));
            args.extend(["-i".to_string(), path.clone()]);
            // Devices that cannot honour the requested size are scaled.
            args.extend(["-vf".to_string(), format!("scale={width}:{height}")]);
        }
        Input::File(path) => {
            // Rotation metadata would swap the probed width and height.
            args.extend(["-re", "-noautorotate", "-i"].map(String::from));
            args.push(path.clone());
        }
    }
    args.extend(["-an", "-pix_fmt", "rgb24", "-f", "rawvideo", "-"].map(String::from));
    args
}

fn probe_dimensions(ffprobe: &str, path: &str) -> Result<(u32, u32), String> {
    let stdout = run_ffprobe(ffprobe, "stream=width,height", "csv=s=x:p=0", path)?;
    parse_dimensions(&stdout).ok_or_else(|| "no video stream found".to_string())
}

/// Average frame rate of the first video stream, if ffprobe reports one.
pub fn probe_frame_rate(ffprobe: &str, path: &str) -> Result<f64, String> {
    let stdout = run_ffprobe(
        ffprobe,
        "stream=r_frame_rate",
        "default=noprint_wrappers=1:nokey=1",
        path,
    )?;
    parse_frame_rate(&stdout).ok_or_else(|| format!("unusable frame rate {:?}", stdout.trim()))
}

fn run_ffprobe(ffprobe: &str, entries: &str, format: &str, path: &str) -> Result<String, String> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            entries,
            "-of",
            format,
            path,
        ])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to run ffprobe: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_dimensions(probe: &str) -> Option<(u32, u32)> {
    let line = probe.lines().next()?.trim().trim_end_matches('x');
    let (w, h) = line.split_once('x')?;
    let (w, h): (u32, u32) = (w.trim().parse().ok()?, h.trim().parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

/// `30000/1001` or `25` as frames per second.
fn parse_frame_rate(probe: &str) -> Option<f64> {
    let line = probe.lines().next()?.trim();
    let fps = match line.split_once('/') {
        Some((num, den)) => {
            let (num, den): (f64, f64) = (num.trim().parse().ok()?, den.trim().parse().ok()?);
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => line.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}


/// A fake `ffmpeg`/`ffprobe` pair in a temporary directory. Both ignore their
/// arguments: the decoder writes the same ten raw 4x2 frames on every run and
/// the prober answers with the frame size or a 25 fps rate.
#[cfg(test)]
pub(crate) mod fixture {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use super::FfmpegSettings;

    pub const WIDTH: u32 = 4;
    pub const HEIGHT: u32 = 2;
    pub const FRAMES: usize = 10;
    const FRAME_BYTES: usize = (WIDTH * HEIGHT * 3) as usize;

    pub struct FakeFfmpeg {
        pub settings: FfmpegSettings,
        /// Decoder that writes the frames and then keeps running.
        pub live_ffmpeg: String,
        /// Empty file standing in for a video.
        pub clip: PathBuf,
        _dir: tempfile::TempDir,
    }

    pub fn frame_bytes(index: usize) -> Vec<u8> {
        (0..FRAME_BYTES).map(|b| (index * 25 + b) as u8).collect()
    }

    pub fn fake_ffmpeg() -> FakeFfmpeg {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("frames.raw");
        let data: Vec<u8> = (0..FRAMES).flat_map(frame_bytes).collect();
        fs::write(&raw, data).unwrap();

        let cat = format!("cat '{}'", raw.display());
        let ffmpeg = script(dir.path(), "ffmpeg", &format!("exec {cat}"));
        let live_ffmpeg = script(dir.path(), "ffmpeg-live", &format!("{cat}\nexec sleep 30"));
        let ffprobe = script(
            dir.path(),
            "ffprobe",
            &format!("case \"$*\" in\n  *r_frame_rate*) echo 25/1 ;;\n  *) echo {WIDTH}x{HEIGHT} ;;\nesac"),
        );
        let clip = dir.path().join("clip.mp4");
        fs::write(&clip, b"").unwrap();

        FakeFfmpeg {
            settings: FfmpegSettings {
                ffmpeg,
                ffprobe,
                width: 640,
                height: 480,
            },
            live_ffmpeg,
            clip,
            _dir: dir,
        }
    }

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }
}
