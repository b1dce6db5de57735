use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "phaseseq", version)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the `.bin` phase frames of a folder into a multi-page TIFF stack.
    Compose(ComposeArgs),
    /// Run the external registration tool on one stack.
    Register(RegisterArgs),
    /// Rewrite a registration log as parameter block + per-frame shifts.
    TranslateLog(TranslateLogArgs),
    /// Encode an aligned TIFF stack and its timestamp table into a bnr container.
    Encode(EncodeArgs),
    /// Check the phase range of bnr containers.
    Check(CheckArgs),
    /// Print the header of a bnr container as JSON.
    Info(InfoArgs),
    /// Write the first frame of a bnr container as a grayscale PNG.
    Preview(PreviewArgs),
    /// Run compose, registration, log translation, encoding and checking for acquisition wells.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Folder holding `*_phase.bin` frames.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Output TIFF stack.
    #[arg(long)]
    out: PathBuf,

    /// Replace the output if it exists.
    #[arg(long)]
    force: bool,
}

#[derive(Parser, Debug)]
struct RegisterArgs {
    /// Pipeline config JSON providing the registration tool settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input TIFF stack.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Aligned output stack.
    #[arg(long)]
    out: PathBuf,

    /// Registration log to write.
    #[arg(long)]
    log: PathBuf,

    /// Also translate the log after the tool finishes.
    #[arg(long)]
    translate: bool,

    #[arg(long)]
    force: bool,
}

#[derive(Parser, Debug)]
struct TranslateLogArgs {
    /// Registration log, rewritten in place.
    log: PathBuf,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    /// Aligned TIFF stack.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Timestamp table (time in column 3).
    #[arg(long)]
    timestamps: PathBuf,

    /// Output bnr path. Defaults to the input path with a `.bnr` extension.
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    metadata: MetadataArgs,

    #[arg(long)]
    force: bool,
}

#[derive(Parser, Debug, Default)]
struct MetadataArgs {
    /// Wavelength in nm.
    #[arg(long)]
    wavelength: Option<f32>,

    /// Refractive index n1.
    #[arg(long)]
    n1: Option<f32>,

    /// Refractive index n2.
    #[arg(long)]
    n2: Option<f32>,

    /// Pixel size in meters.
    #[arg(long)]
    pixel_size: Option<f32>,
}

impl MetadataArgs {
    fn apply(&self, base: phaseseq::AcquisitionMetadata) -> phaseseq::AcquisitionMetadata {
        phaseseq::AcquisitionMetadata {
            wavelength_nm: self.wavelength.unwrap_or(base.wavelength_nm),
            refractive_index_1: self.n1.unwrap_or(base.refractive_index_1),
            refractive_index_2: self.n2.unwrap_or(base.refractive_index_2),
            pixel_size: self.pixel_size.unwrap_or(base.pixel_size),
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScanChoice {
    First,
    Full,
}

impl From<ScanChoice> for phaseseq::ScanMode {
    fn from(c: ScanChoice) -> Self {
        match c {
            ScanChoice::First => phaseseq::ScanMode::FirstFrame,
            ScanChoice::Full => phaseseq::ScanMode::Full,
        }
    }
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Containers to check.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = ScanChoice::First)]
    scan: ScanChoice,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    path: PathBuf,

    /// Include the timestamp block.
    #[arg(long)]
    timestamps: bool,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Koala acquisition folder holding one sub-folder per well.
    #[arg(long)]
    root: PathBuf,

    /// Wells to process. Defaults to the four positions of a 4-well acquisition.
    #[arg(long = "well")]
    wells: Vec<String>,

    /// Folder for the bnr containers (`<well>.bnr`). Defaults to the acquisition folder.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Pipeline config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    metadata: MetadataArgs,

    #[arg(long, value_enum)]
    scan: Option<ScanChoice>,

    /// Keep the intermediate TIFF stacks.
    #[arg(long)]
    keep_intermediates: bool,

    /// Write the run report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Replace existing outputs.
    #[arg(long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Compose(args) => cmd_compose(args),
        Command::Register(args) => cmd_register(args),
        Command::TranslateLog(args) => cmd_translate_log(args),
        Command::Encode(args) => cmd_encode(args),
        Command::Check(args) => cmd_check(args),
        Command::Info(args) => cmd_info(args),
        Command::Preview(args) => cmd_preview(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_progress(percent: u8) {
    if percent > 0 {
        eprint!("\r{percent:>3}%");
    } else {
        eprint!("\r    \r");
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<phaseseq::PipelineConfig> {
    Ok(match path {
        Some(p) => phaseseq::PipelineConfig::from_path(p)?,
        None => phaseseq::PipelineConfig::default(),
    })
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let frames = phaseseq::list_phase_frames(&args.in_dir)?;
    anyhow::ensure!(
        !frames.is_empty(),
        "no .bin frames in '{}'",
        args.in_dir.display()
    );
    let stats = phaseseq::compose_stack(
        &phaseseq::KoalaBinSource,
        &frames,
        &args.out,
        phaseseq::ComposeOpts {
            overwrite: args.force,
        },
        &mut print_progress,
    )?;
    eprintln!(
        "wrote {} ({} pages, {}x{}, pixel size {})",
        args.out.display(),
        stats.pages,
        stats.width,
        stats.height,
        stats.first_header.pixel_size
    );
    Ok(())
}

fn cmd_register(args: RegisterArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let tool = cfg.registration.tool()?;
    let job = phaseseq::RegistrationJob::single(&args.in_path, &args.out, &args.log)
        .with_overwrite(args.force);

    let cancel = phaseseq::CancelToken::new();
    tool.run(&job, &cancel)
        .with_context(|| format!("register '{}'", args.in_path.display()))?;
    eprintln!("wrote {}", args.out.display());

    if args.translate {
        let shifts = phaseseq::translate_log(&args.log)?;
        eprintln!("translated {} shifts into {}", shifts.len(), args.log.display());
    }
    Ok(())
}

fn cmd_translate_log(args: TranslateLogArgs) -> anyhow::Result<()> {
    let shifts = phaseseq::translate_log(&args.log)?;
    if shifts.is_empty() {
        eprintln!("warning: no transformation matrix lines in {}", args.log.display());
    }
    eprintln!("rewrote {} ({} shifts)", args.log.display(), shifts.len());
    Ok(())
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| args.in_path.with_extension("bnr"));
    let metadata = args.metadata.apply(phaseseq::AcquisitionMetadata::default());

    let stats = phaseseq::encode_sequence(
        &args.in_path,
        &args.timestamps,
        &metadata,
        &out,
        phaseseq::EncodeOpts {
            overwrite: args.force,
        },
        &mut print_progress,
    )?;
    eprintln!(
        "wrote {} ({} frames, {}x{})",
        out.display(),
        stats.header.frame_count,
        stats.header.width,
        stats.header.height
    );
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let mut flagged = Vec::new();
    for path in &args.paths {
        let check = phaseseq::validate_container(path, args.scan.into())
            .with_context(|| format!("check '{}'", path.display()))?;
        match &check.violation {
            Some(v) => {
                eprintln!(
                    "PROBLEM {}: min {} max {} outside ±{}",
                    path.display(),
                    v.min,
                    v.max,
                    phaseseq::PHASE_LIMIT
                );
                flagged.push(path.clone());
            }
            None => eprintln!(
                "ok      {}: min {} max {} ({} frame(s) scanned)",
                path.display(),
                check.min,
                check.max,
                check.frames_scanned
            ),
        }
    }
    anyhow::ensure!(
        flagged.is_empty(),
        "{} container(s) out of range, please check them",
        flagged.len()
    );
    Ok(())
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let mut reader = phaseseq::BnrReader::open(&args.path)?;
    let mut value = serde_json::to_value(reader.header()).context("serialize header")?;
    if args.timestamps {
        let times = reader.read_timestamps()?;
        value["timestamps"] = serde_json::to_value(times).context("serialize timestamps")?;
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let mut reader = phaseseq::BnrReader::open(&args.in_path)?;
    let frame = reader
        .next_frame()?
        .with_context(|| format!("'{}' holds no frames", args.in_path.display()))?;
    phaseseq::write_preview_png(&frame, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    cfg.metadata = args.metadata.apply(cfg.metadata);
    if args.metadata.pixel_size.is_some() {
        cfg.pixel_size_from_frames = false;
    }
    if let Some(scan) = args.scan {
        cfg.scan_mode = scan.into();
    }
    cfg.keep_intermediates |= args.keep_intermediates;

    let wells: Vec<String> = if args.wells.is_empty() {
        phaseseq::KOALA_WELLS.iter().map(|w| w.to_string()).collect()
    } else {
        args.wells.clone()
    };
    let out_dir = args.out_dir.clone().unwrap_or_else(|| args.root.clone());
    let jobs: Vec<_> = wells
        .iter()
        .map(|w| phaseseq::SequenceJob::for_well(&args.root, w, out_dir.join(format!("{w}.bnr"))))
        .collect();

    let pipeline = phaseseq::Pipeline::new(cfg, Arc::new(phaseseq::KoalaBinSource))?;
    let (worker, events) = phaseseq::PipelineWorker::new(pipeline);

    let force = args.force;
    let handle = worker.submit(jobs, move |existing: &[PathBuf]| {
        for p in existing {
            eprintln!("exists: {}", p.display());
        }
        if !force {
            eprintln!("refusing to overwrite existing outputs (pass --force)");
        }
        force
    })?;
    // The run thread owns the remaining sender, so the loop ends even if it dies without a final event.
    drop(worker);

    for ev in events.iter() {
        match ev {
            phaseseq::PipelineEvent::JobStarted { job, index, total } => {
                eprintln!("[{}/{}] processing well {job}", index + 1, total)
            }
            phaseseq::PipelineEvent::Stage { job, stage } => eprintln!("  {job}: {stage}"),
            phaseseq::PipelineEvent::Progress { percent, .. } => print_progress(percent),
            phaseseq::PipelineEvent::Warning(msg) => eprintln!("warning: {msg}"),
            phaseseq::PipelineEvent::RangeViolation(v) => {
                eprintln!("PROBLEM with container {}", v.path.display())
            }
            phaseseq::PipelineEvent::JobFinished(r) => {
                eprintln!("  wrote {} ({} frames)", r.output.display(), r.frames)
            }
            phaseseq::PipelineEvent::Finished(_) | phaseseq::PipelineEvent::Failed(_) => break,
        }
    }

    let report = handle.join()?;
    if let Some(path) = &args.report {
        phaseseq::ensure_parent_dir(path)?;
        let f = std::fs::File::create(path)
            .with_context(|| format!("create report '{}'", path.display()))?;
        serde_json::to_writer_pretty(f, &report).context("write run report")?;
    }

    anyhow::ensure!(
        report.violations.is_empty(),
        "{} container(s) out of range, please check them",
        report.violations.len()
    );
    eprintln!("done: {} converted, {} skipped", report.jobs.len(), report.skipped.len());
    Ok(())
}
