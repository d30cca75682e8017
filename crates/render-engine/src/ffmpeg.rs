//! ffmpeg / ffprobe backend.
//!
//! Turns a [`BoundComposition`] into a single `-filter_complex` graph,
//! runs ffmpeg with `-progress pipe:1`, and probes sources with ffprobe.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use reframe_framing_core::Geometry;
use reframe_media_model::{
    AffineTransform, Asset, AssetError, AssetProvider, AssetTrack, Composition, MediaKind, Rect,
    Size, TimeRange,
};

use crate::compositor::BoundComposition;
use crate::export::{
    ContainerFormat, EncodeEngine, EncodeRequest, ExportError, ExportQuality, ExportSettings,
    ProgressReporter,
};
use crate::render_tree::{
    Color, EffectHandle, EffectHost, Gradient, GradientDirection, NodeKind, TimedTransition,
    TransitionTarget,
};

const STALL_WARNING_SECS: u64 = 10;
const STDERR_TAIL_CHARS: usize = 2000;

/// Encode engine that shells out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: String,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EncodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    async fn encode(
        &self,
        request: &EncodeRequest,
        reporter: &ProgressReporter,
    ) -> Result<(), ExportError> {
        let plan = EncodePlan::build(request)?;
        tracing::debug!(args = ?plan.args, "Running ffmpeg");

        let mut child = tokio::process::Command::new(&self.binary)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::encode(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = ?child.id(),
            args_len = plan.args.len(),
            filter_len = plan.filter_graph.len(),
            duration_secs = plan.duration_secs,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::encode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encode("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once the stderr pipe fills up.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let started = Instant::now();
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ExportError::encode(format!("Failed reading ffmpeg progress: {e}")))?
        {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = Instant::now();
            }
            reporter.report(state.fraction(plan.duration_secs));

            if last_progress_wall.elapsed().as_secs() >= STALL_WARNING_SECS {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for 10s"
                );
                last_progress_wall = Instant::now();
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ExportError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ExportError::encode(format!(
                "ffmpeg exited with {status}: {}",
                tail(stderr_output.trim(), STDERR_TAIL_CHARS)
            )));
        }

        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            output = %request.output_path.display(),
            "ffmpeg finished"
        );
        Ok(())
    }
}

/// Fully resolved ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub args: Vec<String>,
    pub filter_graph: String,
    pub duration_secs: f64,
}

impl EncodePlan {
    pub fn build(request: &EncodeRequest) -> Result<Self, ExportError> {
        let bound = &request.bound;
        let duration_secs = bound.duration_secs();
        if duration_secs <= 0.0 {
            return Err(ExportError::encode("Composition has no duration to export"));
        }

        let inputs = collect_inputs(bound.composition());
        let graph = build_filter_graph(bound, &inputs, request.settings.fps, &FfmpegEffectHost)?;

        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for input in &inputs {
            args.push("-i".to_string());
            args.push(input.display().to_string());
        }

        args.push("-filter_complex".to_string());
        args.push(graph.filter.clone());
        args.push("-map".to_string());
        args.push(format!("[{}]", graph.video_label));
        match &graph.audio_label {
            Some(label) => {
                args.push("-map".to_string());
                args.push(format!("[{label}]"));
            }
            None => args.push("-an".to_string()),
        }
        args.push("-r".to_string());
        args.push(request.settings.fps.max(1).to_string());
        args.push("-t".to_string());
        args.push(format!("{duration_secs:.6}"));
        args.append(&mut codec_args(&request.settings));
        args.push(request.output_path.display().to_string());

        tracing::info!(
            inputs = inputs.len(),
            filter_len = graph.filter.len(),
            has_audio = graph.audio_label.is_some(),
            duration_secs,
            "Export plan built"
        );

        Ok(Self {
            args,
            filter_graph: graph.filter,
            duration_secs,
        })
    }
}

/// Realizes panel decorations as ffmpeg filter fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEffectHost;

impl EffectHost for FfmpegEffectHost {
    type Output = String;

    fn apply(&self, effect: &EffectHandle, _region: Rect) -> String {
        match effect.name.as_str() {
            "blur" => format!("gblur=sigma={:.3}", effect.strength.max(0.0)),
            other => {
                tracing::warn!(effect = other, "Unknown effect, panel left undecorated");
                "null".to_string()
            }
        }
    }

    fn transition(
        &self,
        effect: &EffectHandle,
        transition: &TimedTransition,
        region: Rect,
    ) -> String {
        let progress = if transition.duration_secs <= 0.0 {
            "1".to_string()
        } else {
            format!(
                "clip({:.6}+T/{:.6},0,1)",
                transition.start_fraction, transition.duration_secs
            )
        };
        let intensity = match transition.target {
            TransitionTarget::Cleared => format!("(1-{progress})"),
            TransitionTarget::Applied => progress,
        };
        format!(
            "{},format=rgba,geq=r='r(X,Y)':g='g(X,Y)':b='b(X,Y)':a='255*{intensity}'",
            self.apply(effect, region)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FilterGraph {
    filter: String,
    video_label: String,
    audio_label: Option<String>,
}

/// Accumulates filter chains while threading the running "base" label.
struct GraphBuilder {
    chains: Vec<String>,
    base: String,
    counter: usize,
}

impl GraphBuilder {
    fn new(base: String) -> Self {
        Self {
            chains: vec![],
            base,
            counter: 0,
        }
    }

    fn label(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }

    fn push(&mut self, chain: String) {
        self.chains.push(chain);
    }

    fn overlay(&mut self, layer: &str, x: f64, y: f64, window: Option<TimeRange>) {
        let out = self.label("base");
        let enable = window
            .map(|w| {
                format!(
                    ":enable='between(t,{:.6},{:.6})'",
                    w.start_secs,
                    w.end_secs()
                )
            })
            .unwrap_or_default();
        self.chains.push(format!(
            "[{base}][{layer}]overlay=x={x}:y={y}:eof_action=pass{enable}[{out}]",
            base = self.base,
            x = px(x),
            y = px(y),
        ));
        self.base = out;
    }
}

fn collect_inputs(composition: &Composition) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = vec![];
    for track in composition.tracks() {
        for segment in &track.segments {
            if !inputs.contains(&segment.source) {
                inputs.push(segment.source.clone());
            }
        }
    }
    inputs
}

fn input_index(inputs: &[PathBuf], source: &Path) -> Result<usize, ExportError> {
    inputs
        .iter()
        .position(|p| p == source)
        .ok_or_else(|| ExportError::encode(format!("No ffmpeg input for {}", source.display())))
}

fn build_filter_graph(
    bound: &BoundComposition,
    inputs: &[PathBuf],
    fps: u32,
    host: &impl EffectHost<Output = String>,
) -> Result<FilterGraph, ExportError> {
    let composition = bound.composition();
    let natural = composition.natural_size();
    let duration = composition.duration_secs();
    let fps = fps.max(1);

    let mut graph = GraphBuilder::new("base0".to_string());
    graph.push(format!(
        "color=c=black:s={w}x{h}:r={fps}:d={duration:.6}[base0]",
        w = even(natural.width),
        h = even(natural.height),
    ));

    for instruction in bound.instructions() {
        let Some(track) = composition.track(instruction.track()) else {
            continue;
        };
        for segment in &track.segments {
            for entry in instruction.entries() {
                let Some(window) = segment.target_range.intersection(&entry.range) else {
                    continue;
                };
                let input = input_index(inputs, &segment.source)?;
                let source_start = segment.source_range.start_secs
                    + (window.start_secs - segment.target_range.start_secs);
                let layer = graph.label("layer");
                let source = format!(
                    "[{input}:{stream}]trim=start={source_start:.6}:duration={dur:.6},setpts=PTS-STARTPTS+{offset:.6}/TB",
                    stream = segment.source_track_index,
                    dur = window.duration_secs,
                    offset = window.start_secs,
                );

                let (placement, origin) = match entry.geometry {
                    Geometry::Transform(transform) => {
                        // The backdrop transform centers the source on the canvas
                        // origin, so its bounding rect starts at (-W, -H).
                        let size = segment.natural_size.unwrap_or(natural);
                        transform_placement(&transform, size)?
                    }
                    Geometry::Crop(rect) => (
                        format!(
                            "crop={}:{}:{}:{}",
                            px(rect.width),
                            px(rect.height),
                            px(rect.x),
                            px(rect.y)
                        ),
                        rect,
                    ),
                };
                graph.push(format!("{source},{placement}[{layer}]"));
                graph.overlay(&layer, origin.x, origin.y, Some(window));
            }
        }
    }

    for node in bound.render_tree().overlay_nodes() {
        let frame = node.frame;
        if frame.is_empty() {
            continue;
        }
        match &node.kind {
            NodeKind::Video => {}
            NodeKind::Panel { effect, transition } => {
                let keep = graph.label("keep");
                let region = graph.label("region");
                let panel = graph.label("panel");
                graph.push(format!(
                    "[{base}]split[{keep}][{region}]",
                    base = graph.base
                ));
                graph.base = keep;
                let decoration = match transition {
                    Some(t) => host.transition(effect, t, frame),
                    None => host.apply(effect, frame),
                };
                graph.push(format!(
                    "[{region}]crop={}:{}:{}:{},{decoration}[{panel}]",
                    px(frame.width),
                    px(frame.height),
                    px(frame.x),
                    px(frame.y)
                ));
                graph.overlay(&panel, frame.x, frame.y, None);
            }
            NodeKind::Gradient(gradient) => {
                let fill = graph.label("fill");
                graph.push(format!(
                    "color=c=black@0.0:s={w}x{h}:r={fps}:d={duration:.6},format=rgba,{geq}[{fill}]",
                    w = px(frame.width).max(1),
                    h = px(frame.height).max(1),
                    geq = gradient_geq(gradient),
                ));
                graph.overlay(&fill, frame.x, frame.y, None);
            }
        }
    }

    let video_label = "vout".to_string();
    graph.push(format!("[{}]format=yuv420p[{video_label}]", graph.base));

    let audio_label = build_audio_chains(&mut graph, composition, inputs)?;

    Ok(FilterGraph {
        filter: graph.chains.join(";"),
        video_label,
        audio_label,
    })
}

fn build_audio_chains(
    graph: &mut GraphBuilder,
    composition: &Composition,
    inputs: &[PathBuf],
) -> Result<Option<String>, ExportError> {
    let mut labels = vec![];
    for track in composition.tracks_of(MediaKind::Audio) {
        for segment in &track.segments {
            let input = input_index(inputs, &segment.source)?;
            let label = graph.label("a");
            graph.push(format!(
                "[{input}:{stream}]atrim=start={start:.6}:duration={dur:.6},asetpts=PTS-STARTPTS,adelay={delay}:all=1[{label}]",
                stream = segment.source_track_index,
                start = segment.source_range.start_secs,
                dur = segment.target_range.duration_secs,
                delay = (segment.target_range.start_secs * 1000.0).round() as i64,
            ));
            labels.push(label);
        }
    }

    let out = "aout".to_string();
    match labels.len() {
        0 => return Ok(None),
        1 => graph.push(format!("[{}]anull[{out}]", labels[0])),
        n => graph.push(format!(
            "{}amix=inputs={n}:duration=longest[{out}]",
            labels.iter().map(|l| format!("[{l}]")).collect::<String>()
        )),
    }
    Ok(Some(out))
}

/// Scale (and flip) filters plus destination rect for an axis-aligned transform.
fn transform_placement(
    transform: &AffineTransform,
    source: Size,
) -> Result<(String, Rect), ExportError> {
    if !transform.is_axis_aligned() {
        return Err(ExportError::unsupported(
            "rotated or skewed layer transforms cannot be encoded",
        ));
    }
    let dest = transform.apply_to_rect(&Rect::from_size(source));
    if dest.width < 1.0 || dest.height < 1.0 {
        return Err(ExportError::unsupported(format!(
            "layer transform collapses the frame to {}x{}",
            dest.width, dest.height
        )));
    }

    let (sx, sy) = transform.scale_factors();
    let mut filters = vec![format!("scale={}:{}", px(dest.width), px(dest.height))];
    if sx < 0.0 {
        filters.push("hflip".to_string());
    }
    if sy < 0.0 {
        filters.push("vflip".to_string());
    }
    Ok((filters.join(","), dest))
}

/// `geq` filter painting `gradient` across the node frame.
fn gradient_geq(gradient: &Gradient) -> String {
    let var = match gradient.direction() {
        GradientDirection::Horizontal => "X/W",
        GradientDirection::Vertical => "Y/H",
    };
    let stops = gradient.stops();
    let channel = |pick: fn(&Color) -> f64| {
        let points = stops
            .iter()
            .map(|s| (s.position, pick(&s.color) * 255.0))
            .collect();
        build_piecewise_expr(points, var)
    };
    format!(
        "geq=r='{}':g='{}':b='{}':a='{}'",
        channel(|c: &Color| c.r),
        channel(|c: &Color| c.g),
        channel(|c: &Color| c.b),
        channel(|c: &Color| c.a),
    )
}

/// Piecewise-linear expression over `var`, holding the end values outside
/// the point range.
fn build_piecewise_expr(mut points: Vec<(f64, f64)>, var: &str) -> String {
    if points.is_empty() {
        return "0".to_string();
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-6);

    if points.len() == 1 {
        return format!("{:.6}", points[0].1);
    }

    let first = points[0].0;
    let (last, last_value) = points[points.len() - 1];
    let x = format!("clip({var},{first:.6},{last:.6})");

    let mut expr = format!("{last_value:.6}");
    for idx in (0..points.len() - 1).rev() {
        let (t0, v0) = points[idx];
        let (t1, v1) = points[idx + 1];
        let interp = format!(
            "{v0:.6}+({delta:.6})*({x}-{t0:.6})/{dur:.6}",
            delta = v1 - v0,
            dur = (t1 - t0).max(1e-6)
        );
        expr = format!("if(lt({x},{t1:.6}),{interp},{tail})", tail = expr);
    }
    expr
}

fn codec_args(settings: &ExportSettings) -> Vec<String> {
    let args: Vec<&str> = match settings.container {
        ContainerFormat::Mp4 | ContainerFormat::Mov => {
            let (preset, crf, audio_bitrate) = match settings.quality {
                ExportQuality::Highest => ("slow", "18", "256k"),
                ExportQuality::High => ("medium", "20", "192k"),
                ExportQuality::Medium => ("fast", "23", "160k"),
                ExportQuality::Low => ("veryfast", "28", "128k"),
            };
            vec![
                "-c:v",
                "libx264",
                "-preset",
                preset,
                "-crf",
                crf,
                "-profile:v",
                "high",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                audio_bitrate,
                "-movflags",
                "+faststart",
            ]
        }
        ContainerFormat::Webm => {
            let (crf, audio_bitrate) = match settings.quality {
                ExportQuality::Highest => ("24", "192k"),
                ExportQuality::High => ("31", "160k"),
                ExportQuality::Medium => ("36", "128k"),
                ExportQuality::Low => ("42", "96k"),
            };
            vec![
                "-c:v",
                "libvpx-vp9",
                "-crf",
                crf,
                "-b:v",
                "0",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "libopus",
                "-b:a",
                audio_bitrate,
            ]
        }
    };
    args.into_iter().map(str::to_string).collect()
}

/// Check whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn px(v: f64) -> i64 {
    v.round() as i64
}

fn even(v: f64) -> i64 {
    ((px(v) / 2) * 2).max(2)
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            "out_time_ms" => {
                if let Ok(ms) = value.parse::<f64>() {
                    self.out_time_secs = ms / 1_000_000.0;
                }
            }
            "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    }
}

/// Asset provider backed by `ffprobe -of json`.
#[derive(Debug, Clone)]
pub struct FfprobeAssetProvider {
    binary: String,
}

impl Default for FfprobeAssetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeAssetProvider {
    pub fn new() -> Self {
        Self::with_binary("ffprobe")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }
}

impl AssetProvider for FfprobeAssetProvider {
    fn load(&self, source: &Path) -> Result<Asset, AssetError> {
        if !source.exists() {
            return Err(AssetError::AssetNotFound {
                path: source.to_path_buf(),
            });
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration:stream=index,codec_type,codec_name,width,height,duration",
                "-of",
                "json",
            ])
            .arg(source)
            .output()
            .map_err(|e| AssetError::unreadable(source, format!("Failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssetError::unreadable(
                source,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let asset = parse_probe_json(source, &String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(
            source = %source.display(),
            duration_secs = asset.duration_secs(),
            tracks = asset.tracks.len(),
            "Probed asset"
        );
        Ok(asset)
    }

    fn name(&self) -> &str {
        "ffprobe"
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Build an [`Asset`] from ffprobe's JSON output.
pub fn parse_probe_json(source: &Path, json: &str) -> Result<Asset, AssetError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| AssetError::unreadable(source, format!("Invalid ffprobe output: {e}")))?;

    let parse_secs = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    };

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| parse_secs(&f.duration))
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| parse_secs(&s.duration))
                .reduce(f64::max)
        })
        .ok_or_else(|| AssetError::unreadable(source, "ffprobe reported no duration"))?;

    let tracks: Vec<AssetTrack> = probe
        .streams
        .iter()
        .filter_map(|stream| {
            let kind = match stream.codec_type.as_deref() {
                Some("video") => MediaKind::Video,
                Some("audio") => MediaKind::Audio,
                _ => return None,
            };
            let natural_size = match (kind, stream.width, stream.height) {
                (MediaKind::Video, Some(w), Some(h)) if w > 0 && h > 0 => {
                    Some(Size::new(w as f64, h as f64))
                }
                _ => None,
            };
            Some(AssetTrack {
                index: stream.index,
                kind,
                natural_size,
                codec: stream.codec_name.clone().unwrap_or_default(),
            })
        })
        .collect();

    if tracks.is_empty() {
        return Err(AssetError::unreadable(source, "no audio or video streams"));
    }

    Ok(Asset {
        source: source.to_path_buf(),
        time_range: TimeRange::from_duration(duration),
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_tree::ColorStop;
    use crate::test_support::bound_composition;

    fn request(settings: ExportSettings) -> EncodeRequest {
        EncodeRequest {
            bound: bound_composition(),
            output_path: PathBuf::from("/tmp/out/clip-vertical.mp4"),
            settings,
        }
    }

    #[test]
    fn test_piecewise_expr_single_point() {
        assert_eq!(build_piecewise_expr(vec![(0.3, 12.0)], "X/W"), "12.000000");
        assert_eq!(build_piecewise_expr(vec![], "X/W"), "0");
    }

    #[test]
    fn test_piecewise_expr_clamps_outside_stops() {
        let expr = build_piecewise_expr(vec![(1.0, 127.5), (0.8, 0.0)], "X/W");
        assert_eq!(
            expr,
            "if(lt(clip(X/W,0.800000,1.000000),1.000000),0.000000+(127.500000)*(clip(X/W,0.800000,1.000000)-0.800000)/0.200000,127.500000)"
        );
    }

    #[test]
    fn test_gradient_geq_uses_axis_variable() {
        let stops = vec![
            ColorStop::new(Color::BLACK.with_alpha(0.5), 0.0),
            ColorStop::new(Color::TRANSPARENT, 0.2),
        ];
        let horizontal = Gradient::new(GradientDirection::Horizontal, stops.clone()).unwrap();
        let vertical = Gradient::new(GradientDirection::Vertical, stops).unwrap();

        let geq = gradient_geq(&horizontal);
        assert!(geq.starts_with("geq=r='"));
        assert!(geq.contains("clip(X/W,0.000000,0.200000)"));
        assert!(geq.contains(":a='if(lt("));
        assert!(gradient_geq(&vertical).contains("clip(Y/H,0.000000,0.200000)"));
    }

    #[test]
    fn test_effect_host_fragments() {
        let host = FfmpegEffectHost;
        let region = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(host.apply(&EffectHandle::blur(20.0), region), "gblur=sigma=20.000");
        assert_eq!(host.apply(&EffectHandle::new("sparkle", 1.0), region), "null");

        let fading = host.transition(
            &EffectHandle::blur(20.0),
            &TimedTransition::toward_cleared(1.0, 0.1),
            region,
        );
        assert!(fading.starts_with("gblur=sigma=20.000,format=rgba,geq="));
        assert!(fading.ends_with("a='255*(1-clip(0.100000+T/1.000000,0,1))'"));
    }

    #[test]
    fn test_transform_placement() {
        let size = Size::new(1920.0, 1080.0);
        let zoom = AffineTransform::scale(2.0, 2.0).translated_by(-960.0, -540.0);
        let (filters, dest) = transform_placement(&zoom, size).unwrap();
        assert_eq!(filters, "scale=3840:2160");
        assert_eq!(dest, Rect::new(-1920.0, -1080.0, 3840.0, 2160.0));

        let mirrored = AffineTransform::scale(-1.0, 1.0).translated_by(-1920.0, 0.0);
        let (filters, _) = transform_placement(&mirrored, size).unwrap();
        assert_eq!(filters, "scale=1920:1080,hflip");

        let rotated = AffineTransform {
            a: 0.0,
            b: 1.0,
            c: -1.0,
            d: 0.0,
            tx: 0.0,
            ty: 0.0,
        };
        assert!(matches!(
            transform_placement(&rotated, size),
            Err(ExportError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_plan_builds_vertical_graph() {
        let plan = EncodePlan::build(&request(ExportSettings::default())).unwrap();
        let graph = &plan.filter_graph;

        assert!(graph.starts_with("color=c=black:s=1920x1080:r=30:d=10.000000[base0]"));
        assert!(graph.contains("scale=3840:2160"));
        assert!(graph.contains("overlay=x=-1920:y=-1080"));
        assert!(graph.contains("crop=608:1080:656:0"));
        assert!(graph.contains("overlay=x=656:y=0"));
        assert!(graph.contains("crop=656:1080:0:0,gblur=sigma=20.000"));
        assert!(graph.contains("crop=656:1080:1264:0,gblur=sigma=20.000"));
        // Only the two panel regions are blurred; the backdrop is just scaled.
        assert_eq!(graph.matches("gblur").count(), 2);
        assert!(!graph.contains("scale=3840:2160,gblur"));
        assert!(graph.contains("color=c=black@0.0:s=656x1080"));
        assert!(graph.contains("adelay=0:all=1"));
        assert!(graph.ends_with("anull[aout]"));

        let background = graph.find("scale=3840:2160").unwrap();
        let foreground = graph.find("crop=608:1080:656:0").unwrap();
        let panels = graph.find("gblur").unwrap();
        assert!(background < foreground && foreground < panels);

        assert!((plan.duration_secs - 10.0).abs() < 1e-9);
        let args = plan.args.join(" ");
        assert!(args.contains("-progress pipe:1"));
        assert!(args.contains("-i clips/landscape.mp4"));
        assert!(args.contains("-map [vout] -map [aout]"));
        assert!(args.contains("-r 30 -t 10.000000"));
        assert_eq!(
            plan.args.last().map(String::as_str),
            Some("/tmp/out/clip-vertical.mp4")
        );
    }

    #[test]
    fn test_codec_args_follow_container_and_quality() {
        let mp4 = codec_args(&ExportSettings::default()).join(" ");
        assert!(mp4.contains("-c:v libx264 -preset slow -crf 18"));
        assert!(mp4.contains("-movflags +faststart"));

        let webm = codec_args(&ExportSettings {
            container: ContainerFormat::Webm,
            quality: ExportQuality::Low,
            fps: 24,
        })
        .join(" ");
        assert!(webm.contains("-c:v libvpx-vp9 -crf 42 -b:v 0"));
        assert!(webm.contains("-c:a libopus"));
    }

    #[test]
    fn test_progress_state_parsing() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        assert!((state.fraction(10.0) - 0.25).abs() < 1e-9);
        state.update("out_time_ms", "20000000");
        assert_eq!(state.fraction(10.0), 1.0);
        state.update("out_time_us", "N/A");
        assert_eq!(state.out_time_secs, 20.0);

        let mut done = ProgressState::default();
        done.update("progress", "end");
        assert_eq!(done.fraction(0.0), 1.0);
    }

    #[test]
    fn test_tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
    }

    #[test]
    fn test_parse_probe_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"index": 1, "codec_type": "audio", "codec_name": "aac"},
                {"index": 2, "codec_type": "data"}
            ],
            "format": {"duration": "14.720000"}
        }"#;
        let asset = parse_probe_json(Path::new("talk.mp4"), json).unwrap();
        assert_eq!(asset.tracks.len(), 2);
        assert!((asset.duration_secs() - 14.72).abs() < 1e-9);
        let video = asset.first_track(MediaKind::Video).unwrap();
        assert_eq!(video.natural_size, Some(Size::new(1920.0, 1080.0)));
        assert_eq!(asset.first_track(MediaKind::Audio).unwrap().index, 1);
    }

    #[test]
    fn test_parse_probe_json_falls_back_to_stream_duration() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "audio", "codec_name": "opus", "duration": "3.5"}]}"#;
        let asset = parse_probe_json(Path::new("voice.webm"), json).unwrap();
        assert_eq!(asset.duration_secs(), 3.5);
    }

    #[test]
    fn test_parse_probe_json_rejects_streamless_input() {
        let err = parse_probe_json(Path::new("x.bin"), r#"{"format": {"duration": "1.0"}}"#)
            .unwrap_err();
        assert!(matches!(err, AssetError::AssetUnreadable { .. }));

        let err = parse_probe_json(Path::new("x.bin"), "not json").unwrap_err();
        assert!(matches!(err, AssetError::AssetUnreadable { .. }));
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let provider = FfprobeAssetProvider::new();
        let err = provider
            .load(Path::new("/definitely/not/here.mp4"))
            .unwrap_err();
        assert!(matches!(err, AssetError::AssetNotFound { .. }));
    }
}
