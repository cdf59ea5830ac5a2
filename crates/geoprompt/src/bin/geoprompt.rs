use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use geoprompt::core::{BoundingBox, Crs, LogFilter};
use geoprompt::dataset::run_export_file;
use geoprompt::tiling::{JsonlRoiStore, RoiStore};

/// Bounding box given as `xmin,ymin,xmax,ymax`.
#[derive(Clone, Copy, Debug)]
struct BboxArg([f64; 4]);

impl std::str::FromStr for BboxArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            return Err("Expected 'xmin,ymin,xmax,ymax'".into());
        }
        let mut out = [0.0; 4];
        for (slot, p) in out.iter_mut().zip(&parts) {
            *slot = p.parse().map_err(|e| format!("bad coordinate {p:?}: {e}"))?;
        }
        Ok(BboxArg(out))
    }
}

#[derive(Subcommand, Debug)]
enum RoiCommand {
    /// Append a region of interest to the store
    Add {
        /// JSON-lines ROI store
        #[arg(long)]
        db: PathBuf,

        /// Extent as xmin,ymin,xmax,ymax
        #[arg(long, allow_hyphen_values = true)]
        bbox: BboxArg,

        /// CRS of the extent, e.g. EPSG:3857
        #[arg(long)]
        crs: String,
    },

    /// Print every stored ROI as one JSON object per line
    List {
        #[arg(long)]
        db: PathBuf,
    },

    /// Replace the store's contents with the ROIs of another JSON-lines file
    Load {
        #[arg(long)]
        db: PathBuf,

        /// File to read the ROIs from
        #[arg(long)]
        from: PathBuf,
    },

    /// Copy every stored ROI to another file
    Backup {
        #[arg(long)]
        db: PathBuf,

        /// Destination file
        #[arg(long)]
        to: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage saved regions of interest
    #[command(subcommand)]
    Roi(RoiCommand),

    /// Cut image/label tiles for every saved ROI
    Export {
        /// Export config (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Georeferenced prompt segmentation tools", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(verbose: u8) -> Result<(), Box<dyn Error>> {
    let filter = LogFilter::from_verbosity(verbose);
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        geoprompt::core::init_tracing(false, filter);
    }
    #[cfg(not(feature = "tracing"))]
    geoprompt::core::init_with_filter(filter)?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Roi(RoiCommand::Add { db, bbox, crs }) => {
            let [x0, y0, x1, y1] = bbox.0;
            let mut store = JsonlRoiStore::open(db)?;
            let record = store.insert(BoundingBox::new(x0, y0, x1, y1, Crs::new(crs)))?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::Roi(RoiCommand::List { db }) => {
            for record in JsonlRoiStore::open(db)?.list()? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Command::Roi(RoiCommand::Load { db, from }) => {
            let n = JsonlRoiStore::open(db)?.load(&from)?;
            println!("loaded {n} roi(s)");
        }
        Command::Roi(RoiCommand::Backup { db, to }) => {
            let n = JsonlRoiStore::open(db)?.backup(&to)?;
            println!("backed up {n} roi(s)");
        }
        Command::Export { config } => {
            let manifest = run_export_file(config)?;
            println!(
                "{} tiles, {} skipped roi(s)",
                manifest.tiles.len(),
                manifest.skipped_rois.len()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match init_logging(cli.verbose).and_then(|_| run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
