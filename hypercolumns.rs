// hypercolumns.rs
// Command line entry points for the hypercolumn pipeline.
//
//   train    fit the patch classifier on one raw image per band
//   extract  tile images, pool hypercolumns of selected layers into a matrix file
//   cluster  fit mini-batch k-means over a matrix file
//
// Band images are raw little-endian f32 arrays of image_height x image_width
// (see the JSON config). Logging goes to stderr; set RUST_LOG to change the level.

use astro_hypercolumns::architecture::build_model;
use astro_hypercolumns::checkpoint::load_params;
use astro_hypercolumns::cluster::MiniBatchKMeans;
use astro_hypercolumns::config::{load_config, TrainingConfig, UnitsKind};
use astro_hypercolumns::data::{
    load_cube, load_training_set, normalize_bands, tile_cube, Augmenter, DihedralAugmenter,
    IdentityUnits, ImageCube, Luptitude, NoAugmentation, RandomPatchSource, UnitConverter,
};
use astro_hypercolumns::hypercolumns::{aggregate_to_file, MmapMatrix};
use astro_hypercolumns::network::Network;
use astro_hypercolumns::trainer::Trainer;
use astro_hypercolumns::utils::SimpleRng;
use astro_hypercolumns::Error;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "hypercolumns", version, about = "Pixel segmentation from CNN hypercolumns")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the patch classifier
    Train {
        /// JSON training configuration; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// One raw band image per character of `bands`, in the same order
        #[arg(short, long, num_args = 1.., required = true)]
        images: Vec<PathBuf>,

        /// Parameters restored before the first epoch
        #[arg(long)]
        pretrained: Option<PathBuf>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        classes: Option<usize>,

        #[arg(long)]
        size: Option<usize>,

        #[arg(long)]
        bands: Option<String>,
    },

    /// Aggregate hypercolumns of the selected layers into a matrix file
    Extract {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trained parameters
        #[arg(long)]
        checkpoint: PathBuf,

        #[arg(short, long, num_args = 1.., required = true)]
        images: Vec<PathBuf>,

        /// Zero-based layer indices, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        layers: Vec<usize>,

        /// Matrix file; its shape is written to `<output>.json`
        #[arg(short, long)]
        output: PathBuf,

        /// Also fit k-means with this many clusters once the matrix is written
        #[arg(long)]
        clusters: Option<usize>,

        /// Where the cluster model goes when `--clusters` is given
        #[arg(long, default_value = "clusters.json")]
        model: PathBuf,
    },

    /// Fit mini-batch k-means over an aggregated matrix
    Cluster {
        #[arg(short, long)]
        matrix: PathBuf,

        #[arg(short = 'k', long)]
        clusters: usize,

        #[arg(short, long, default_value = "clusters.json")]
        output: PathBuf,

        #[arg(long, default_value_t = 1024)]
        batch_size: usize,

        #[arg(long, default_value_t = 100)]
        max_iter: usize,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match Cli::parse().command {
        Command::Train {
            config,
            images,
            pretrained,
            epochs,
            classes,
            size,
            bands,
        } => {
            let mut config = read_config(config.as_deref())?;
            if let Some(epochs) = epochs {
                config.num_epochs = epochs;
            }
            if let Some(classes) = classes {
                config.num_classes = classes;
            }
            if let Some(size) = size {
                config.size = size;
            }
            if let Some(bands) = bands {
                config.bands = bands;
            }
            train(config, &images, pretrained.as_deref())?;
        }
        Command::Extract {
            config,
            checkpoint,
            images,
            layers,
            output,
            clusters,
            model,
        } => {
            let config = read_config(config.as_deref())?;
            let seed = config.seed;
            extract(&config, &checkpoint, &images, &layers, &output)?;
            if let Some(clusters) = clusters {
                let kmeans = MiniBatchKMeans {
                    seed,
                    ..MiniBatchKMeans::new(clusters)
                };
                cluster(&output, &kmeans, &model)?;
            }
        }
        Command::Cluster {
            matrix,
            clusters,
            output,
            batch_size,
            max_iter,
            seed,
        } => {
            let kmeans = MiniBatchKMeans {
                batch_size,
                max_iter,
                seed,
                ..MiniBatchKMeans::new(clusters)
            };
            cluster(&matrix, &kmeans, &output)?;
        }
    }

    Ok(())
}

fn read_config(path: Option<&Path>) -> Result<TrainingConfig, Error> {
    match path {
        Some(path) => load_config(path),
        None => Ok(TrainingConfig::default()),
    }
}

fn converter(units: UnitsKind) -> Box<dyn UnitConverter> {
    match units {
        UnitsKind::Luptitude => Box::new(Luptitude),
        UnitsKind::Identity => Box::new(IdentityUnits),
    }
}

fn read_cube(config: &TrainingConfig, images: &[PathBuf]) -> Result<ImageCube, Error> {
    let bands = config.bands.chars().count();
    if images.len() != bands {
        return Err(Error::InvalidConfig(format!(
            "{} images given for {} bands ({})",
            images.len(),
            bands,
            config.bands
        )));
    }
    load_cube(images, config.image_width, config.image_height)
}

fn build_network(config: &TrainingConfig, rng: &mut SimpleRng) -> Result<Network, Error> {
    build_model(&config.architecture(), config.input_shape(), rng)
}

fn train(config: TrainingConfig, images: &[PathBuf], pretrained: Option<&Path>) -> Result<(), Error> {
    let mut rng = SimpleRng::from_optional_seed(config.seed);
    let cube = read_cube(&config, images)?;

    let mut source = RandomPatchSource::new(rng.fork());
    let dataset = load_training_set(
        &cube,
        &config.bands,
        config.num_classes,
        config.size,
        &mut source,
        converter(config.units).as_ref(),
    )?;
    log::info!(
        "Extracted {} patches of {}x{} over {} bands",
        dataset.len(),
        config.size,
        config.size,
        dataset.channels()
    );

    let mut network = build_network(&config, &mut rng)?;
    let mut augmenter: Box<dyn Augmenter> = if config.augment {
        Box::new(DihedralAugmenter::new(rng.fork()))
    } else {
        Box::new(NoAugmentation)
    };

    let mut trainer = Trainer::new(config)?;
    let report = trainer.train(&mut network, &dataset, augmenter.as_mut(), pretrained)?;

    match report.checkpoint_epoch {
        Some(epoch) => log::info!(
            "Best parameters (epoch {}) are in {}",
            epoch + 1,
            trainer.config().checkpoint_path.display()
        ),
        None => log::warn!("No checkpoint was written"),
    }
    Ok(())
}

fn extract(
    config: &TrainingConfig,
    checkpoint: &Path,
    images: &[PathBuf],
    layers: &[usize],
    output: &Path,
) -> Result<(), Error> {
    let cube = read_cube(config, images)?;
    let mut tiles = tile_cube(&cube, config.size)?;
    normalize_bands(&mut tiles, &config.bands, converter(config.units).as_ref())?;

    let mut network = build_network(config, &mut SimpleRng::from_optional_seed(config.seed))?;
    load_params(&mut network, checkpoint)?;

    let matrix = aggregate_to_file(&network, layers, &tiles, output)?;
    log::info!("Wrote hypercolumns of {} tiles to {}", tiles.len(), matrix.path().display());
    Ok(())
}

fn cluster(matrix: &Path, kmeans: &MiniBatchKMeans, output: &Path) -> Result<(), Error> {
    let matrix = MmapMatrix::open(matrix)?;
    let model = kmeans.fit(&matrix)?;
    model.save(output)?;
    log::info!(
        "Saved {} centroids over {} features to {}",
        model.n_clusters(),
        model.n_features,
        output.display()
    );
    Ok(())
}
