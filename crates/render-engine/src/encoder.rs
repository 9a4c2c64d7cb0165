//! Frame sinks: where the composited raster stream goes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use scenestitch_common::{StitchError, StitchResult};
use scenestitch_timeline_model::{ExportFormat, ExportSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

/// Consumer of an ordered stream of straight-alpha RGBA8 frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Sink name, for logs.
    fn name(&self) -> &str;

    /// Prepare for frames of `width × height` at `fps`.
    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> StitchResult<()>;

    /// Append one frame of `width * height * 4` bytes.
    async fn push_frame(&mut self, rgba: &[u8]) -> StitchResult<()>;

    /// Flush and close, returning the artifact path.
    async fn finish(&mut self) -> StitchResult<PathBuf>;

    /// Discard a partially written output.
    async fn abort(&mut self) {}
}

struct FfmpegProcess {
    child: Child,
    stdin: ChildStdin,
    stderr_task: JoinHandle<String>,
}

/// Pipes raw RGBA frames into an ffmpeg process.
pub struct FfmpegSink {
    binary: String,
    output: PathBuf,
    format: ExportFormat,
    video_bitrate_kbps: u32,
    frame_len: usize,
    frames_written: u64,
    process: Option<FfmpegProcess>,
    /// Set once ffmpeg was started on `output`, which it truncates.
    owns_output: bool,
}

impl FfmpegSink {
    pub fn new(binary: impl Into<String>, output: impl Into<PathBuf>, settings: &ExportSettings) -> Self {
        Self {
            binary: binary.into(),
            output: output.into(),
            format: settings.format,
            video_bitrate_kbps: settings.video_bitrate_kbps,
            frame_len: 0,
            frames_written: 0,
            process: None,
            owns_output: false,
        }
    }

    /// Check if the encoder binary can be found.
    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn input_args(&self, width: u32, height: u32, fps: u32) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            format!("{width}x{height}"),
            "-r".to_string(),
            fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ];
        args.extend(codec_args_for_format(self.format, self.video_bitrate_kbps));
        args.push(self.output.display().to_string());
        args
    }
}

#[async_trait]
impl FrameSink for FfmpegSink {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> StitchResult<()> {
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args = self.input_args(width, height, fps);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StitchError::encode(format!("Failed to start {}: {e}", self.binary)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StitchError::encode("Failed to capture ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| StitchError::encode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            output = %self.output.display(),
            format = ?self.format,
            "ffmpeg process started"
        );

        self.owns_output = true;
        self.frame_len = width as usize * height as usize * 4;
        self.frames_written = 0;
        self.process = Some(FfmpegProcess {
            child,
            stdin,
            stderr_task,
        });
        Ok(())
    }

    async fn push_frame(&mut self, rgba: &[u8]) -> StitchResult<()> {
        if rgba.len() != self.frame_len {
            return Err(StitchError::encode(format!(
                "Frame is {} bytes, expected {}",
                rgba.len(),
                self.frame_len
            )));
        }
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| StitchError::encode("ffmpeg sink was not started"))?;
        process
            .stdin
            .write_all(rgba)
            .await
            .map_err(|e| StitchError::encode(format!("Failed writing frame to ffmpeg: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> StitchResult<PathBuf> {
        let FfmpegProcess {
            mut child,
            mut stdin,
            stderr_task,
        } = self
            .process
            .take()
            .ok_or_else(|| StitchError::encode("ffmpeg sink was not started"))?;

        stdin.shutdown().await?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| StitchError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(StitchError::encode(format!(
                "ffmpeg export failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }

        tracing::info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "ffmpeg finished"
        );
        Ok(self.output.clone())
    }

    async fn abort(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
            process.stderr_task.abort();
        }
        if !std::mem::take(&mut self.owns_output) {
            return;
        }
        if self.output.exists() {
            if let Err(e) = tokio::fs::remove_file(&self.output).await {
                tracing::warn!(error = %e, output = %self.output.display(), "Failed to remove partial output");
            }
        }
    }
}

/// Writes each frame as a numbered PNG plus a `manifest.json`.
pub struct ImageSequenceSink {
    dir: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    frames: Vec<PathBuf>,
    /// `dir` did not exist before `begin`.
    created_dir: bool,
}

impl ImageSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            width: 0,
            height: 0,
            fps: 0,
            frames: vec![],
            created_dir: false,
        }
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }
}

#[async_trait]
impl FrameSink for ImageSequenceSink {
    fn name(&self) -> &str {
        "image-sequence"
    }

    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> StitchResult<()> {
        self.created_dir = !tokio::fs::try_exists(&self.dir).await?;
        tokio::fs::create_dir_all(&self.dir).await?;
        self.width = width;
        self.height = height;
        self.fps = fps;
        self.frames.clear();
        Ok(())
    }

    async fn push_frame(&mut self, rgba: &[u8]) -> StitchResult<()> {
        let frame = RgbaImage::from_raw(self.width, self.height, rgba.to_vec()).ok_or_else(|| {
            StitchError::encode(format!(
                "Frame is {} bytes, expected {}x{} RGBA",
                rgba.len(),
                self.width,
                self.height
            ))
        })?;
        let path = self.dir.join(format!("frame_{:06}.png", self.frames.len()));
        let target = path.clone();
        tokio::task::spawn_blocking(move || frame.save_with_format(&target, ImageFormat::Png))
            .await
            .map_err(|e| StitchError::encode(format!("PNG writer task failed: {e}")))?
            .map_err(|e| StitchError::encode(format!("Failed to write {}: {e}", path.display())))?;
        self.frames.push(path);
        Ok(())
    }

    async fn finish(&mut self) -> StitchResult<PathBuf> {
        let manifest = serde_json::json!({
            "width": self.width,
            "height": self.height,
            "fps": self.fps,
            "frames": self.frames.len(),
        });
        let path = self.dir.join("manifest.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;
        tracing::info!(dir = %self.dir.display(), frames = self.frames.len(), "Wrote image sequence");
        Ok(self.dir.clone())
    }

    /// Removes the frames written so far, and the directory itself when
    /// `begin` created it.
    async fn abort(&mut self) {
        let frames = std::mem::take(&mut self.frames);
        if std::mem::take(&mut self.created_dir) {
            if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
                tracing::warn!(error = %e, dir = %self.dir.display(), "Failed to remove partial image sequence");
            }
            return;
        }
        for frame in frames {
            if let Err(e) = tokio::fs::remove_file(&frame).await {
                tracing::warn!(error = %e, frame = %frame.display(), "Failed to remove partial frame");
            }
        }
    }
}

/// Encoder arguments for `format`, placed after the raw input.
pub fn codec_args_for_format(format: ExportFormat, video_bitrate_kbps: u32) -> Vec<String> {
    let video_bitrate = format!("{}k", video_bitrate_kbps.max(1000));

    match format {
        ExportFormat::Mp4H264 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-profile:v".to_string(),
            "high".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
            "-movflags".to_string(),
            "+faststart".to_string(),
        ],
        ExportFormat::Mp4H265 => vec![
            "-c:v".to_string(),
            "libx265".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
            "-movflags".to_string(),
            "+faststart".to_string(),
        ],
        ExportFormat::Gif => vec![
            "-vf".to_string(),
            "fps=15,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse".to_string(),
        ],
        ExportFormat::Webm => vec![
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-pix_fmt".to_string(),
            "yuva420p".to_string(),
            "-b:v".to_string(),
            video_bitrate,
        ],
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_h264_args() {
        let args = codec_args_for_format(ExportFormat::Mp4H264, 4000);
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-b:v", "4000k"));
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_bitrate_has_floor() {
        let args = codec_args_for_format(ExportFormat::Webm, 0);
        assert!(has_pair(&args, "-b:v", "1000k"));
    }

    #[test]
    fn test_ffmpeg_input_args_describe_raw_stream() {
        let sink = FfmpegSink::new("ffmpeg", "/tmp/out.gif", &ExportSettings {
            format: ExportFormat::Gif,
            ..ExportSettings::default()
        });
        let args = sink.input_args(320, 180, 24);
        assert!(has_pair(&args, "-pix_fmt", "rgba"));
        assert!(has_pair(&args, "-s", "320x180"));
        assert!(has_pair(&args, "-r", "24"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.gif"));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let sink = FfmpegSink::new(
            "scenestitch-no-such-encoder",
            "/tmp/x.mp4",
            &ExportSettings::default(),
        );
        assert!(!sink.is_available());
    }

    #[tokio::test]
    async fn test_image_sequence_sink_writes_frames_and_manifest() {
        let dir = std::env::temp_dir().join(format!("scenestitch-seq-{}", std::process::id()));
        let mut sink = ImageSequenceSink::new(&dir);
        sink.begin(2, 2, 30).await.unwrap();
        sink.push_frame(&[255u8; 16]).await.unwrap();
        sink.push_frame(&[0u8; 16]).await.unwrap();
        assert!(sink.push_frame(&[0u8; 3]).await.is_err());

        let out = sink.finish().await.unwrap();
        assert_eq!(sink.frames().len(), 2);
        assert!(out.join("frame_000001.png").exists());
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["frames"], 2);

        sink.abort().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_image_sequence_abort_keeps_existing_dir_contents() {
        let dir = std::env::temp_dir().join(format!("scenestitch-seq-existing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "keep me").unwrap();

        let mut sink = ImageSequenceSink::new(&dir);
        sink.begin(2, 2, 30).await.unwrap();
        sink.push_frame(&[255u8; 16]).await.unwrap();
        sink.abort().await;

        assert!(dir.join("notes.txt").exists());
        assert!(!dir.join("frame_000000.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_ffmpeg_abort_before_begin_keeps_existing_output() {
        let output = std::env::temp_dir().join(format!("scenestitch-existing-{}.mp4", std::process::id()));
        std::fs::write(&output, b"earlier export").unwrap();

        let mut sink = FfmpegSink::new("scenestitch-no-such-encoder", &output, &ExportSettings::default());
        sink.abort().await;

        assert_eq!(std::fs::read(&output).unwrap(), b"earlier export");
        std::fs::remove_file(&output).unwrap();
    }
}
