use anyhow::{bail, Context, Result};
use cardio_lib::{
    config::AnalysisConfig,
    detectors::minute::estimate_minute_hr_with_config,
    io::{
        discover::list_inputs,
        export::{write_export_json, write_hr_csv, ExportStats, HrExport},
        hr_json::parse_hr_json,
        waveform::{display_name, read_file_lead_segments},
    },
    metrics::hr::{hr_time_stats, range_stats, HrTimeStats, RangeStats},
    pipeline::{AnalysisWorker, InputKind, PauseToken, PipelineUpdate, RunSummary},
    plot::{
        figure_hr_histogram, figure_hr_line, figure_hr_poincare, figure_hr_scatter, Figure,
        PlotBackend, RefLineKind, Series,
    },
    signal::{parse_timestamp, ClockZone, HrSeries},
};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{debug, error, info};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    thread,
};

#[derive(Parser)]
#[command(
    name = "cardio",
    version,
    about = "Minute-wise heart rate extraction from multi-lead ECG recordings"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    #[value(name = "raw-ecg")]
    RawEcg,
    #[value(name = "hr-json")]
    HrJson,
}

impl From<KindArg> for InputKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::RawEcg => InputKind::RawEcg,
            KindArg::HrJson => InputKind::HrJson,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotKind {
    Scatter,
    Line,
    Histogram,
    Poincare,
}

/// Waveform options shared by the raw ECG commands. Unset flags keep the config value.
#[derive(Args, Debug, Default)]
struct LeadArgs {
    #[arg(long)]
    total_leads: Option<usize>,
    /// 1-based lead to extract
    #[arg(long)]
    target_lead: Option<usize>,
    #[arg(long)]
    fs: Option<f64>,
    /// Interpret recordTime in UTC instead of the local zone
    #[arg(long)]
    utc: bool,
}

impl LeadArgs {
    fn apply(&self, cfg: &mut AnalysisConfig) {
        if let Some(total) = self.total_leads {
            cfg.total_leads = total;
        }
        if let Some(target) = self.target_lead {
            cfg.target_lead = target;
        }
        if let Some(fs) = self.fs {
            cfg.sampling_rate = fs;
        }
        if self.utc {
            cfg.clock_zone = ClockZone::Utc;
        }
    }
}

#[derive(Args, Debug, Default)]
struct RangeArgs {
    /// Range start, "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    start: Option<String>,
    /// Range end, "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    end: Option<String>,
}

impl RangeArgs {
    fn bounds(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        match (&self.start, &self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => {
                let start = parse_timestamp(start)
                    .with_context(|| format!("invalid --start '{}'", start))?;
                let end = parse_timestamp(end).with_context(|| format!("invalid --end '{}'", end))?;
                Ok(Some((start, end)))
            }
            _ => bail!("--start and --end must be given together"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract HR from every input file, combine, and summarise
    Analyze {
        /// Directory scanned (non-recursively) for inputs of the selected kind
        #[arg(long, conflicts_with = "input")]
        dir: Option<PathBuf>,
        /// Explicit input files, processed in the order given
        #[arg(long, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(long)]
        kind: Option<KindArg>,
        /// TOML analysis settings
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        lead: LeadArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Read "p"/"pause" and "r"/"resume" commands from stdin while running
        #[arg(long)]
        interactive: bool,
    },
    /// Minute-wise HR samples of a single raw ECG file
    FileHr {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        lead: LeadArgs,
    },
    /// Time-domain statistics of an HR-JSON file
    HrStats {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Render an HR-JSON file to a PNG via plotters
    HrPlot {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "scatter")]
        kind: PlotKind,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 20)]
        bins: usize,
        #[arg(long, default_value_t = 4000)]
        max_points: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Analyze {
            dir,
            input,
            kind,
            config,
            lead,
            range,
            export,
            csv,
            interactive,
        } => cmd_analyze(AnalyzeArgs {
            dir,
            input,
            kind,
            config,
            lead,
            range,
            export,
            csv,
            interactive,
        })?,
        Commands::FileHr {
            input,
            config,
            lead,
        } => cmd_file_hr(&input, config.as_deref(), &lead)?,
        Commands::HrStats { input, range } => cmd_hr_stats(&input, &range)?,
        Commands::HrPlot {
            input,
            kind,
            out,
            bins,
            max_points,
        } => cmd_hr_plot(&input, kind, &out, bins, max_points)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_hr_input(path: &Path) -> Result<HrSeries> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_hr_json(&text, &display_name(path))
}

struct AnalyzeArgs {
    dir: Option<PathBuf>,
    input: Vec<PathBuf>,
    kind: Option<KindArg>,
    config: Option<PathBuf>,
    lead: LeadArgs,
    range: RangeArgs,
    export: Option<PathBuf>,
    csv: Option<PathBuf>,
    interactive: bool,
}

#[derive(Serialize)]
struct AnalyzeOutput {
    #[serde(flatten)]
    summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<RangeStats>,
}

/// Forward stdin commands to the pause token until stdin closes.
fn spawn_pause_console(pause: PauseToken) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" | "pause" => pause.pause(),
                "r" | "resume" => pause.resume(),
                "" => {}
                other => eprintln!("unknown command '{}' (use p/pause or r/resume)", other),
            }
        }
        // A closed console can no longer resume the run.
        pause.resume();
    });
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(kind) = args.kind {
        cfg.input_kind = kind.into();
    }
    args.lead.apply(&mut cfg);
    let bounds = args.range.bounds()?;

    let files = match &args.dir {
        Some(dir) => list_inputs(dir, cfg.input_kind)?,
        None => args.input.clone(),
    };
    let pause = PauseToken::new();
    let worker = AnalysisWorker::spawn(cfg.to_request(files), pause.clone())?;
    if args.interactive {
        spawn_pause_console(pause);
    }
    for update in worker.updates().iter() {
        debug!("{:?}", update);
        match update {
            PipelineUpdate::Paused if args.interactive => {
                eprintln!("Analysis paused. Type 'r' to resume.")
            }
            PipelineUpdate::Resumed if args.interactive => eprintln!("Analysis resumed."),
            _ => {}
        }
    }
    let result = worker.join()?;

    // A bad range only loses the range block; the finished run is still reported.
    let range = bounds.and_then(|(start, end)| {
        range_stats(&result.dataset, start, end)
            .map_err(|err| error!("Time range statistics failed: {}", err))
            .ok()
    });
    if let Some(path) = &args.export {
        let stats = ExportStats::from_parts(
            result.summary.stats,
            range.as_ref().and_then(|r| r.stats),
        );
        write_export_json(path, &HrExport::new(&result.dataset, stats))?;
    }
    if let Some(path) = &args.csv {
        write_hr_csv(path, &result.dataset)?;
    }
    let output = AnalyzeOutput {
        summary: result.summary,
        range,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn cmd_file_hr(input: &Path, config: Option<&Path>, lead: &LeadArgs) -> Result<()> {
    let mut cfg = load_config(config)?;
    lead.apply(&mut cfg);
    let params = cfg.params();
    let report = read_file_lead_segments(input, &params.lead, params.zone)?;
    let samples =
        estimate_minute_hr_with_config(&report.segments, params.sampling_rate, &params.minute_hr)?;
    info!(
        "{}: {} HR sample(s) from {} segment(s)",
        display_name(input),
        samples.len(),
        report.segments.len()
    );
    println!("{}", serde_json::to_string(&samples)?);
    Ok(())
}

#[derive(Serialize)]
struct StatsOutput {
    points: usize,
    stats: Option<HrTimeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<RangeStats>,
}

fn cmd_hr_stats(input: &Path, range: &RangeArgs) -> Result<()> {
    let series = read_hr_input(input)?;
    let range = match range.bounds()? {
        Some((start, end)) => Some(range_stats(&series, start, end)?),
        None => None,
    };
    let output = StatsOutput {
        points: series.len(),
        stats: hr_time_stats(&series.heart_rates),
        range,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn cmd_hr_plot(
    input: &Path,
    kind: PlotKind,
    out: &Path,
    bins: usize,
    max_points: usize,
) -> Result<()> {
    let series = read_hr_input(input)?;
    let fig = match kind {
        PlotKind::Scatter => figure_hr_scatter(&series)?,
        PlotKind::Line => figure_hr_line(&series, max_points)?,
        PlotKind::Histogram => figure_hr_histogram(&series.heart_rates, bins)?,
        PlotKind::Poincare => figure_hr_poincare(&series.heart_rates)?,
    };
    PngBackend::new(out).draw(&fig)?;
    info!("Figure written to {}", out.display());
    Ok(())
}

fn shape(style: &cardio_lib::plot::Style) -> ShapeStyle {
    let (r, g, b) = style.color.rgb();
    RGBColor(r, g, b)
        .mix(style.opacity as f64)
        .stroke_width(style.width.round().max(1.0) as u32)
}

/// Split a straight segment into alternating on/off pieces.
fn dash_pieces(a: (f64, f64), b: (f64, f64), pieces: usize) -> Vec<[(f64, f64); 2]> {
    let at = |t: f64| (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
    (0..pieces)
        .step_by(2)
        .map(|i| {
            [
                at(i as f64 / pieces as f64),
                at((i + 1) as f64 / pieces as f64),
            ]
        })
        .collect()
}

/// PNG output through plotters' bitmap backend.
struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: (1000, 600),
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        draw_plotters_figure(&self.path, self.size, fig)
    }
}

fn draw_plotters_figure(path: &Path, size: (u32, u32), fig: &Figure) -> Result<()> {
    let Some((x_min, x_max, y_min, y_max)) = fig.bounds() else {
        bail!("figure has no data to draw");
    };
    let y_pad = (y_max - y_min) * 0.05;
    let (y_min, y_max) = (y_min - y_pad, y_max + y_pad);

    let backend = BitMapBackend::new(path, size);
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let style = shape(&line.style);
                let points: Vec<(f64, f64)> = line.points.iter().map(|p| (p[0], p[1])).collect();
                let mut drawn = if line.style.dash.is_some() && points.len() == 2 {
                    chart.draw_series(
                        dash_pieces(points[0], points[1], 41)
                            .into_iter()
                            .map(move |piece| PathElement::new(piece.to_vec(), style)),
                    )?
                } else {
                    chart.draw_series(plotters::series::LineSeries::new(points, style))?
                };
                drawn
                    .label(line.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
            }
            Series::Scatter(scatter) => {
                let style = shape(&scatter.style).filled();
                let radius = scatter.style.width.round().max(1.0) as u32;
                chart
                    .draw_series(
                        scatter
                            .points
                            .iter()
                            .map(move |p| Circle::new((p[0], p[1]), radius, style)),
                    )?
                    .label(scatter.name.clone())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 4, style));
            }
            Series::Bars(bars) => {
                let style = shape(&bars.style).filled();
                chart
                    .draw_series(
                        bars.bars
                            .iter()
                            .map(move |b| Rectangle::new([(b[0], 0.0), (b[1], b[2])], style)),
                    )?
                    .label(bars.name.clone())
                    .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], style));
            }
        }
    }

    for line in &fig.ref_lines {
        let style = shape(&line.style);
        let (a, b) = match line.kind {
            RefLineKind::Horizontal => ((x_min, line.value), (x_max, line.value)),
            RefLineKind::Vertical => ((line.value, y_min), (line.value, y_max)),
        };
        let pieces = if line.style.dash.is_some() {
            dash_pieces(a, b, 41)
        } else {
            vec![[a, b]]
        };
        chart
            .draw_series(
                pieces
                    .into_iter()
                    .map(move |piece| PathElement::new(piece.to_vec(), style)),
            )?
            .label(line.name.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
