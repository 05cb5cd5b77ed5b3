use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::module::AutodiffModule;
use burn_autodiff::Autodiff;
use burn_candle::{Candle, CandleDevice};
use fourier_dnn_core::{
    data::COORD_DIM,
    encode_rgb_png_data_url, ensure_report_file, find_best_std_dev, init_tracing, load_or_init,
    prediction_file_name,
    report::{render_configuration, render_samples, render_sweep, render_training},
    save_rgb_png, test_model, train_model, Command, ExperimentMode, FourierMlp, HyperParameters,
    ImageEvaluation, ImageRegressionDataset, JsonlTracker, RegressionImage, ReportSection, RunArgs,
    SampleImage, Split, SweepResult, TrainingTrial, DEFAULT_REPORT_TEMPLATE, USAGE,
};
use serde::{Deserialize, Serialize};
use tracing::info;

type TrainingBackend = Autodiff<Candle<f32, i64>>;

const TEST_RESOLUTION: usize = 32;
const TEST_IMAGE_COUNT: usize = 4;
const TEST_EPOCHS: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct ExperimentConfig {
    hyperparameters: HyperParameters,
    resolution: usize,
    data_dir: Option<PathBuf>,
    image_index: usize,
    sweep: SweepConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct SweepConfig {
    start: u32,
    end: u32,
    epochs: usize,
    images: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            hyperparameters: HyperParameters::default(),
            resolution: 512,
            data_dir: None,
            image_index: 1,
            sweep: SweepConfig::default(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start: 1,
            end: 20,
            epochs: 100,
            images: 16,
        }
    }
}

struct ExperimentPaths {
    config: PathBuf,
    report: PathBuf,
    metrics: PathBuf,
    sweep: PathBuf,
    outputs: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let args = RunArgs::parse_from_env()?;
    if args.help_requested {
        println!("{USAGE}");
        return Ok(());
    }

    let paths = initialize_paths()?;
    let config: ExperimentConfig = load_or_init(&paths.config, ExperimentConfig::default)?;
    ensure_report_file(&paths.report, DEFAULT_REPORT_TEMPLATE)?;

    info!(
        command = args.command.label(),
        mode = args.mode.label(),
        "running image regression experiment"
    );

    let dataset = load_dataset(&args, &config)?;
    let device = CandleDevice::Cpu;

    match args.command {
        Command::Train => run_train(&args, &config, &dataset, &device, &paths),
        Command::Sweep => run_sweep(&args, &config, &dataset, &device, &paths),
    }
}

fn initialize_paths() -> Result<ExperimentPaths> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("runs/image_regression");
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create experiment directory {}", dir.display()))?;

    Ok(ExperimentPaths {
        config: dir.join("config.json"),
        report: dir.join("report.md"),
        metrics: dir.join("metrics.jsonl"),
        sweep: dir.join("sweep.json"),
        outputs: dir.join("outputs"),
    })
}

fn load_dataset(args: &RunArgs, config: &ExperimentConfig) -> Result<ImageRegressionDataset> {
    let data_dir = args.data_dir.as_ref().or(config.data_dir.as_ref());
    match (args.mode, data_dir) {
        (ExperimentMode::Full, Some(dir)) => {
            ImageRegressionDataset::load_dir(dir, config.resolution)
        }
        (ExperimentMode::Full, None) => bail!(
            "no image directory configured; pass --data DIR, set data_dir in the config, or use --mode test"
        ),
        (ExperimentMode::Test, _) => ImageRegressionDataset::synthetic(
            TEST_IMAGE_COUNT,
            TEST_RESOLUTION,
            config.hyperparameters.seed,
        ),
    }
}

/// Shrink the model in test mode so a run finishes in seconds.
fn effective_params(mode: ExperimentMode, params: &HyperParameters) -> HyperParameters {
    match mode {
        ExperimentMode::Full => params.clone(),
        ExperimentMode::Test => HyperParameters {
            num_layers: 2,
            num_units: 32,
            num_units_ffm: 32,
            batch_size: 256,
            epochs: TEST_EPOCHS,
            ..params.clone()
        },
    }
}

fn run_train(
    args: &RunArgs,
    config: &ExperimentConfig,
    dataset: &ImageRegressionDataset,
    device: &CandleDevice,
    paths: &ExperimentPaths,
) -> Result<()> {
    let mut params = effective_params(args.mode, &config.hyperparameters);
    if let Some(epochs) = args.epochs {
        params.epochs = epochs;
    }
    let index = args
        .image
        .unwrap_or_else(|| args.mode.select(config.image_index, 0));
    let image = dataset.get(index)?;

    let mut tracker = JsonlTracker::open(&paths.metrics, format!("train_image_{index}"))?;
    tracker.log_config(&params)?;

    let model = FourierMlp::<TrainingBackend>::init(&params, COORD_DIM, device, params.seed)?;
    let outcome = train_model(model, image, &params, device, &mut tracker)?;
    let evaluation = test_model(
        &outcome.model.valid(),
        image,
        params.batch_size,
        device,
        &mut tracker,
    )?;

    println!("train PSNR: {:.2}", evaluation.metrics.train_psnr);
    println!("test PSNR: {:.2}", evaluation.metrics.test_psnr);

    if args.save_output {
        save_predictions(&paths.outputs, index, image, &evaluation)?;
    }

    let sections = [
        ReportSection::new("configuration", render_configuration(&params)),
        ReportSection::new(
            "metrics",
            render_training(&outcome.history, &evaluation.metrics),
        ),
        ReportSection::new("samples", render_samples(&sample_images(index, image, &evaluation)?)),
    ];
    fourier_dnn_core::update_sections(&paths.report, &sections)
}

fn run_sweep(
    args: &RunArgs,
    config: &ExperimentConfig,
    dataset: &ImageRegressionDataset,
    device: &CandleDevice,
    paths: &ExperimentPaths,
) -> Result<()> {
    let sweep = &config.sweep;
    let start = args.start.unwrap_or(args.mode.select(sweep.start, 1));
    let end = args.end.unwrap_or(args.mode.select(sweep.end, 3));
    let images = args.images.unwrap_or(args.mode.select(sweep.images, 2));
    dataset.require_images(images)?;
    let epochs = args
        .epochs
        .unwrap_or(args.mode.select(sweep.epochs, TEST_EPOCHS));
    let params = effective_params(args.mode, &config.hyperparameters).with_epochs(epochs);

    let mut tracker = JsonlTracker::open(&paths.metrics, format!("sweep_{start}_{end}"))?;
    tracker.log_config(&params)?;

    let mut trial = TrainingTrial::<TrainingBackend> {
        dataset,
        params: params.clone(),
        device: device.clone(),
        tracker: &mut tracker,
    };
    let result = find_best_std_dev(start..=end, images, &mut trial)?;

    for candidate in &result.candidates {
        println!(
            "Average PSNR for STD {} = {:.2}",
            candidate.std_dev, candidate.mean_score
        );
    }
    println!("best std_dev: {}", result.best_std_dev);

    save_sweep(&paths.sweep, &result)?;
    let sections = [
        ReportSection::new("configuration", render_configuration(&params)),
        ReportSection::new("sweep", render_sweep(&result)),
    ];
    fourier_dnn_core::update_sections(&paths.report, &sections)
}

fn save_predictions(
    dir: &Path,
    index: usize,
    image: &RegressionImage,
    evaluation: &ImageEvaluation,
) -> Result<()> {
    for (split, data, prediction) in [
        (Split::Train, &image.train, &evaluation.train_prediction),
        (Split::Test, &image.test, &evaluation.test_prediction),
    ] {
        let path = dir.join(prediction_file_name(index, split));
        save_rgb_png(&path, data.width() as u32, data.height() as u32, prediction)?;
        println!("Image saved as {}", path.display());
    }
    Ok(())
}

fn sample_images(
    index: usize,
    image: &RegressionImage,
    evaluation: &ImageEvaluation,
) -> Result<Vec<SampleImage>> {
    let mut samples = Vec::with_capacity(3);
    for (title, data, pixels) in [
        ("Target", &image.test, image.test.pixels()),
        ("Train prediction", &image.train, evaluation.train_prediction.as_slice()),
        ("Test prediction", &image.test, evaluation.test_prediction.as_slice()),
    ] {
        samples.push(SampleImage {
            title: format!("{title} (image {index})"),
            data_url: encode_rgb_png_data_url(data.width() as u32, data.height() as u32, pixels)?,
        });
    }
    Ok(samples)
}

fn save_sweep(path: &Path, result: &SweepResult) -> Result<()> {
    let serialized = serde_json::to_string_pretty(result)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write sweep results to {}", path.display()))?;
    info!(path = %path.display(), "saved sweep results");
    Ok(())
}
