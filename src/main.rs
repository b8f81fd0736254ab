//! tankobon - manga to EPUB and kepub packager

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tankobon::{BuildConfig, KepubConfig, ReadingDirection, WidePolicy};

#[derive(Parser)]
#[command(name = "tankobon")]
#[command(version, about = "Package manga chapters as EPUB and kepub", long_about = None)]
#[command(after_help = "EXAMPLES:
    tankobon build manga/ manga.epub --rtl --crop --split split
    tankobon build manga/ manga.epub --kepub manga.kepub.epub --series \"Series\"
    tankobon kepub book.epub book.kepub.epub")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only report warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Report per-chapter progress
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build an EPUB from a directory of volumes and chapters
    Build(BuildArgs),
    /// Convert an existing EPUB to kepub
    Kepub(KepubArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Directory laid out as <volume>/<chapter>/<page>.{jpg,png,webp}
    #[arg(value_name = "DIR")]
    input: PathBuf,

    /// Output EPUB file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Trim whitespace around page content
    #[arg(long)]
    crop: bool,

    /// How to handle wide (two-page) spreads
    #[arg(long, value_enum, default_value = "preserve")]
    split: WidePolicy,

    /// Right-to-left page progression
    #[arg(long)]
    rtl: bool,

    /// Book title (defaults to the directory name)
    #[arg(long)]
    title: Option<String>,

    /// Book author
    #[arg(long)]
    author: Option<String>,

    /// Number of image encode workers
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Also write a kepub to this path
    #[arg(long, value_name = "KEPUB")]
    kepub: Option<PathBuf>,

    #[command(flatten)]
    series: SeriesArgs,

    /// Print build diagnostics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct KepubArgs {
    /// Input EPUB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output kepub file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    #[command(flatten)]
    series: SeriesArgs,
}

#[derive(Args)]
struct SeriesArgs {
    /// Series title recorded in the kepub metadata
    #[arg(long)]
    series: Option<String>,

    /// Position in the series
    #[arg(long, requires = "series")]
    series_index: Option<f32>,
}

impl SeriesArgs {
    fn config(&self) -> KepubConfig {
        match self.series {
            Some(ref series) => KepubConfig::new().with_series(series, self.series_index),
            None => KepubConfig::new(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result = match cli.command {
        Command::Build(ref args) => build(args, cli.quiet),
        Command::Kepub(ref args) => kepub(args, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build(args: &BuildArgs, quiet: bool) -> Result<(), String> {
    let tree = tankobon::load_dir(&args.input).map_err(|e| e.to_string())?;

    let direction = if args.rtl {
        ReadingDirection::Rtl
    } else {
        ReadingDirection::Ltr
    };
    let mut config = BuildConfig::default()
        .with_crop(args.crop)
        .with_wide_policy(args.split)
        .with_direction(direction)
        .with_workers(args.workers);
    if let Some(ref title) = args.title {
        config = config.with_title(title);
    }
    if let Some(ref author) = args.author {
        config = config.with_author(author);
    }

    let (package, diagnostics) = tankobon::build(&tree, &config).map_err(|e| e.to_string())?;
    package.write_file(&args.output).map_err(|e| e.to_string())?;
    report(quiet, &args.output);

    if let Some(ref kepub_path) = args.kepub {
        tankobon::kepub::transform_package_file(&package, kepub_path, &args.series.config())
            .map_err(|e| e.to_string())?;
        report(quiet, kepub_path);
    }

    package.cleanup().map_err(|e| e.to_string())?;

    if args.json {
        let json = serde_json::to_string_pretty(&diagnostics).map_err(|e| e.to_string())?;
        println!("{json}");
    } else if !quiet {
        println!(
            "{} volumes, {} chapters, {} pages -> {} images ({} split, {} downscaled)",
            diagnostics.volumes,
            diagnostics.chapters,
            diagnostics.pages,
            diagnostics.images,
            diagnostics.split_pages,
            diagnostics.downscaled
        );
    }
    Ok(())
}

fn kepub(args: &KepubArgs, quiet: bool) -> Result<(), String> {
    tankobon::kepub::transform_file(&args.input, &args.output, &args.series.config())
        .map_err(|e| e.to_string())?;
    report(quiet, &args.output);
    Ok(())
}

fn report(quiet: bool, path: &Path) {
    if !quiet {
        println!("Wrote {}", path.display());
    }
}
