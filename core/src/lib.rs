pub mod config;
pub mod data;
pub mod experiment;
pub mod ffm;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod report;
pub mod rng;
pub mod sweep;
pub mod tracking;
pub mod train;
pub mod visualization;

pub use config::{load_or_init, HyperParameters};
pub use data::{ImageRegressionDataset, ImageSplit, RegressionImage};
pub use experiment::{Command, ExperimentMode, RunArgs, USAGE};
pub use ffm::{BasicFfm, GaussianFfm};
pub use logging::init_tracing;
pub use metrics::{psnr, EpochMetrics, EvaluationMetrics};
pub use model::FourierMlp;
pub use report::{
    ensure_report_file, update_sections, ReportSection, SampleImage, DEFAULT_REPORT_TEMPLATE,
};
pub use rng::seeded_rng;
pub use sweep::{find_best_std_dev, BandwidthTrial, SweepResult, TrainingTrial};
pub use tracking::{JsonlTracker, NullTracker, TaggedTracker, Tracker};
pub use train::{predict, test_model, train_model, ImageEvaluation, TrainOutcome};
pub use visualization::{encode_rgb_png_data_url, prediction_file_name, save_rgb_png, Split};
