/*! Panel simulator command line front end.

Thin adapter between files and the core: `panel` generates frames straight
from the panel model and writes them, `pipeline` drives the full four-layer
pipeline with boundary verification. Both load an optional JSON config and
write frames to disk.

```no_run
$ panelsim panel --output frames/ --format raw
$ panelsim pipeline --output frames/ --mode single
$ panelsim pipeline --input pipeline.json --output frames/ --mode continuous --frames 300 -vv
```

Exit codes: 0 on success, 1 on any pipeline or I/O failure, 2 when
`--input` does not exist.
*/
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use panelsim::frame::Frame;
use panelsim::panel::{PanelConfig, PanelLayer, Pattern};
use panelsim::pipeline::{PipelineBuilder, PipelineConfig};
use panelsim::storage::{FrameWriter, RawWriter, TiffWriter};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Mode {
    /// One frame.
    Single,
    /// `--frames` frames back to back.
    Continuous,
    /// One flat-field frame with noise and defects disabled.
    Calibration,
}

impl Mode {
    fn frame_count(self, frames: u32) -> u32 {
        match self {
            Mode::Continuous => frames,
            Mode::Single | Mode::Calibration => 1,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Format {
    Tiff,
    Raw,
}

impl Format {
    fn writer(self) -> Box<dyn FrameWriter> {
        match self {
            Format::Tiff => Box::new(TiffWriter),
            Format::Raw => Box::new(RawWriter),
        }
    }
}

#[derive(clap::Args, Debug)]
struct PanelArgs {
    #[arg(long, short, help = "JSON panel config file")]
    input: Option<PathBuf>,

    #[arg(long, short, help = "Directory to write frames to")]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "single")]
    mode: Mode,

    #[arg(long, value_enum, default_value = "tiff")]
    format: Format,

    #[arg(long, default_value = "1", help = "Frame count for continuous mode")]
    frames: u32,
}

#[derive(clap::Args, Debug)]
struct PipelineArgs {
    #[arg(long, short, help = "JSON pipeline config file")]
    input: Option<PathBuf>,

    #[arg(long, short, help = "Directory to write frames to")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "single")]
    mode: Mode,

    #[arg(long, value_enum, default_value = "tiff")]
    format: Format,

    #[arg(long, default_value = "1", help = "Frame count for continuous mode")]
    frames: u32,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Generate frames straight from the panel model, no transport layers.
    Panel(PanelArgs),
    /// Run the full panel -> FPGA -> MCU -> host pipeline.
    Pipeline(PipelineArgs),
}

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    #[arg(
        short = 'v',
        long,
        global = true,
        action = clap::ArgAction::Count
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn calibrate(panel: &mut PanelConfig) {
    panel.pattern = Pattern::FlatField { baseline: 0x8000 };
    panel.noise_sigma = 0.0;
    panel.defect_rate = 0.0;
}

fn write_frame(writer: &mut dyn FrameWriter, frame: &Frame, dir: &Path) -> anyhow::Result<()> {
    let path = dir.join(format!(
        "frame_{:06}.{}",
        frame.frame_number(),
        writer.extension()
    ));
    writer.write(frame, &path)?;
    Ok(())
}

fn run_panel(args: &PanelArgs) -> anyhow::Result<bool> {
    let mut config: PanelConfig = match &args.input {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PanelConfig::default(),
    };
    if args.mode == Mode::Calibration {
        calibrate(&mut config);
    }
    std::fs::create_dir_all(&args.output)?;
    let mut writer = args.format.writer();
    let mut panel = PanelLayer::new(config)?;
    let count = args.mode.frame_count(args.frames);
    for n in 1..=count {
        let frame = panel.generate(n)?;
        write_frame(writer.as_mut(), &frame, &args.output)?;
    }
    println!("wrote {count} frames to {}", args.output.display());
    Ok(true)
}

fn run_pipeline(args: &PipelineArgs, verbose: u8) -> anyhow::Result<bool> {
    let mut config: PipelineConfig = match &args.input {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if args.mode == Mode::Calibration {
        calibrate(&mut config.panel);
    }

    let mut builder = PipelineBuilder::from_config(config);
    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
        builder = builder.writer(args.format.writer(), dir.clone());
    }
    let mut pipeline = builder.build()?;

    let count = args.mode.frame_count(args.frames);
    let results = pipeline.run(count)?;
    let ok = results.iter().filter(|r| r.success).count();
    println!("{ok}/{count} frames passed all boundary checks");
    if verbose > 0 {
        for line in pipeline.status() {
            println!("{line}");
        }
        for result in &results {
            println!("{}", serde_json::to_string_pretty(&result.checkpoints)?);
        }
    }
    Ok(ok == results.len())
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("panelsim")
        .verbosity(opt.verbose as usize)
        .init()
        .expect("logger init");

    let input = match &opt.command {
        Command::Panel(args) => args.input.as_deref(),
        Command::Pipeline(args) => args.input.as_deref(),
    };
    if let Some(input) = input
        && !input.exists()
    {
        eprintln!("input not found: {}", input.display());
        return ExitCode::from(2);
    }
    let result = match &opt.command {
        Command::Panel(args) => run_panel(args),
        Command::Pipeline(args) => run_pipeline(args, opt.verbose),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("one or more frames failed verification");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
