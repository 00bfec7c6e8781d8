use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geo::polygon;
use std::path::{Path, PathBuf};

use rslst::collect::global_variables::LEGEND_STEPS;
use rslst::collect::stac::StacCollect;
use rslst::collect::{ImagerySource, MemoryImagery};
use rslst::map::drawing::polygon_from_geojson;
use rslst::map::{MapView, ThermalSession};
use rslst::thermal::Legend;
use rslst::LstConfig;

#[derive(Parser, Debug)]
#[command(
    name = "rslst",
    version,
    about = "Land-surface temperature maps of Hermosillo from Landsat ST_B10"
)]
struct Cli {
    /// TOML configuration; defaults to the Hermosillo September 2020 setup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for layer.png, legend.json and stats.json
    #[arg(short, long, global = true, default_value = "output")]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Temperature over the fixed region
    Map,
    /// Reduced temperature over a drawn polygon
    Redraw {
        /// GeoJSON polygon, inline or as a file path
        #[arg(long)]
        polygon: String,
    },
    /// Draw, finalize and clear on a synthetic archive
    Demo,
    /// Print the legend for a temperature range
    Legend {
        #[arg(long, allow_negative_numbers = true)]
        min: f64,
        #[arg(long, allow_negative_numbers = true)]
        max: f64,
        #[arg(long, default_value_t = LEGEND_STEPS)]
        steps: usize,
    },
}

fn load_config(path: Option<&Path>) -> Result<LstConfig> {
    match path {
        Some(path) => LstConfig::from_file(path),
        None => Ok(LstConfig::default()),
    }
}

/// Print the displayed view and write its layer, legend and statistics to `dir`
fn report<S: ImagerySource>(session: &ThermalSession<S, MapView>, dir: &Path) -> Result<()> {
    let view = session.view().context("Nothing is displayed")?;
    println!("{}", view.legend.to_text());
    println!("Stats: {}", view.stats.to_json());

    std::fs::create_dir_all(dir).context(format!("Failed to create {:?}", dir))?;
    session.display().render_png(&dir.join("layer.png"))?;
    let legend = serde_json::to_string_pretty(&view.legend).context("Failed to serialize legend")?;
    std::fs::write(dir.join("legend.json"), legend).context("Failed to write legend.json")?;
    std::fs::write(dir.join("stats.json"), view.stats.to_json())
        .context("Failed to write stats.json")?;
    println!("Outputs written to {:?}", dir);
    Ok(())
}

fn read_polygon(arg: &str) -> Result<String> {
    let path = Path::new(arg);
    if path.exists() {
        std::fs::read_to_string(path).context(format!("Failed to read polygon file: {:?}", path))
    } else {
        Ok(arg.to_string())
    }
}

fn run_demo(config: LstConfig, output: &Path) -> Result<()> {
    let source = MemoryImagery::hermosillo_demo(&config.band);
    let mut session = ThermalSession::new(config, source, MapView::new())?;

    println!("Initial load");
    session.initial_load()?;
    report(&session, &output.join("initial"))?;

    session.recenter();
    session.start_drawing()?;
    session.complete_shape(polygon![
        (x: -110.87, y: 29.08),
        (x: -110.82, y: 29.08),
        (x: -110.82, y: 29.13),
        (x: -110.87, y: 29.13),
    ])?;
    println!("Finalize drawn polygon");
    session.finalize()?;
    session.set_opacity(0.8)?;
    report(&session, &output.join("redraw"))?;

    println!("Clear all drawings");
    session.clear_all()?;
    report(&session, &output.join("cleared"))?;

    println!(
        "{} searches, {} band loads",
        session.source().search_count(),
        session.source().load_count()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Map => {
            let config = load_config(cli.config.as_deref())?;
            let source = StacCollect::new(config.stac.clone())?;
            let mut session = ThermalSession::new(config, source, MapView::new())?;
            session.initial_load()?;
            report(&session, &cli.output)?;
        }
        Command::Redraw { polygon } => {
            let config = load_config(cli.config.as_deref())?;
            let geometry = polygon_from_geojson(&read_polygon(&polygon)?)?;
            let source = StacCollect::new(config.stac.clone())?;
            let mut session = ThermalSession::new(config, source, MapView::new())?;
            session.start_drawing()?;
            session.complete_shape(geometry)?;
            session.finalize()?;
            report(&session, &cli.output)?;
        }
        Command::Demo => {
            let config = load_config(cli.config.as_deref())?;
            run_demo(config, &cli.output)?;
        }
        Command::Legend { min, max, steps } => {
            let config = load_config(cli.config.as_deref())?;
            let legend = Legend::build("Temperature (°C)", min, max, &config.palette, steps)?;
            println!("{}", legend.to_text());
        }
    }
    Ok(())
}
