//! Local preview window.
//!
//! Frames are JPEG-encoded and piped into `ffplay`. The user stops the
//! preview by typing `q` (then Enter) on the terminal, or by closing the
//! player window, which ends the child process.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use frame_enhance_common::frame::TimestampedFrame;
use tracing::{debug, info, warn};

use super::pipe::ChildPipe;
use super::{FrameSink, SinkError, SinkStatus};
use crate::encode::encode_jpeg;

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub program: String,
    pub args: Vec<String>,
    pub quality: u8,
    /// Spawn a thread that watches stdin for `q`.
    pub watch_terminal: bool,
}

impl PreviewSettings {
    pub fn ffplay(program: impl Into<String>, quality: u8) -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-window_title",
            "frame-enhance",
            "-fflags",
            "nobuffer",
            "-f",
            "mjpeg",
            "-i",
            "-",
        ]
        .map(String::from)
        .to_vec();
        Self {
            program: program.into(),
            args,
            quality,
            watch_terminal: true,
        }
    }
}

pub struct PreviewSink {
    pipe: Option<ChildPipe>,
    quality: u8,
    quit: Arc<AtomicBool>,
}

impl PreviewSink {
    pub fn spawn(settings: &PreviewSettings) -> Result<Self, SinkError> {
        let pipe = ChildPipe::spawn(&settings.program, &settings.args, false)?;
        let quit = Arc::new(AtomicBool::new(false));
        if settings.watch_terminal {
            watch_terminal(Arc::clone(&quit));
        }
        info!(program = %settings.program, "preview started, type q to stop");
        Ok(Self {
            pipe: Some(pipe),
            quality: settings.quality,
            quit,
        })
    }

    /// Flag that stops the preview at the next delivery when set.
    #[cfg(test)]
    fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }
}

fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

fn watch_terminal(quit: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("preview-keys".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if is_quit_command(&line) => {
                        quit.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not watch terminal for q; close the window to stop");
    }
}

impl FrameSink for PreviewSink {
    fn deliver(&mut self, frame: &TimestampedFrame) -> Result<SinkStatus, SinkError> {
        if self.quit.load(Ordering::SeqCst) {
            info!("stop requested from terminal");
            return Ok(SinkStatus::StopRequested);
        }
        let Some(pipe) = self.pipe.as_mut() else {
            return Err(SinkError::Closed);
        };
        if pipe.has_exited() {
            info!(program = pipe.program(), "preview window closed");
            return Ok(SinkStatus::StopRequested);
        }

        let jpeg = encode_jpeg(frame.image(), self.quality)?;
        match pipe.write(&jpeg) {
            Ok(()) => {
                debug!(seq = frame.seq(), bytes = jpeg.len(), "preview frame written");
                Ok(SinkStatus::Continue)
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                info!(program = pipe.program(), "preview window closed");
                Ok(SinkStatus::StopRequested)
            }
            Err(e) => Err(SinkError::Write(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Some(pipe) = self.pipe.take() {
            pipe.kill();
            info!("preview closed");
        }
    }

    fn name(&self) -> &str {
        "preview"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_enhance_common::frame::FrameImage;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    fn frame() -> TimestampedFrame {
        TimestampedFrame::new(FrameImage::Rgb(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))), 0, 0)
    }

    fn settings(program: &str) -> PreviewSettings {
        PreviewSettings {
            program: program.into(),
            args: Vec::new(),
            quality: 80,
            watch_terminal: false,
        }
    }

    #[test]
    fn quit_command_matching() {
        assert!(is_quit_command("q"));
        assert!(is_quit_command(" Q \n"));
        assert!(!is_quit_command("quit"));
        assert!(!is_quit_command(""));
    }

    #[test]
    fn ffplay_reads_mjpeg_from_stdin() {
        let settings = PreviewSettings::ffplay("ffplay", 80);
        assert!(settings.args.ends_with(&["-f", "mjpeg", "-i", "-"].map(String::from)));
    }

    #[test]
    fn quit_flag_requests_stop() {
        let mut sink = PreviewSink::spawn(&settings("cat")).unwrap();
        assert_eq!(sink.deliver(&frame()).unwrap(), SinkStatus::Continue);
        sink.quit_flag().store(true, Ordering::SeqCst);
        assert_eq!(sink.deliver(&frame()).unwrap(), SinkStatus::StopRequested);
        sink.close();
        sink.close();
        assert!(matches!(sink.deliver(&frame()), Ok(SinkStatus::StopRequested)));
    }

    #[test]
    fn player_exit_requests_stop() {
        let mut sink = PreviewSink::spawn(&settings("true")).unwrap();
        let mut status = SinkStatus::Continue;
        for _ in 0..100 {
            status = sink.deliver(&frame()).unwrap();
            if status == SinkStatus::StopRequested {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(status, SinkStatus::StopRequested);
        sink.close();
    }

    #[test]
    fn missing_player_fails_to_spawn() {
        assert!(matches!(
            PreviewSink::spawn(&settings("/nonexistent/ffplay")),
            Err(SinkError::Spawn { .. })
        ));
    }
}
