use std::{fmt::Write, fs, path::Path};

use anyhow::{anyhow, Context, Result};

use crate::{
    config::HyperParameters,
    metrics::{EpochMetrics, EvaluationMetrics},
    sweep::SweepResult,
};

pub const DEFAULT_REPORT_TEMPLATE: &str = r"# Fourier Feature Image Regression

<!-- SECTION:overview start -->
<!-- Fit an MLP on Fourier features of pixel coordinates and record reconstruction quality. -->
<!-- SECTION:overview end -->

## Configuration

<!-- SECTION:configuration start -->
<!-- Populated automatically with the parameters from the latest run. -->
<!-- SECTION:configuration end -->

## Training

<!-- SECTION:metrics start -->
<!-- Populated automatically with per-epoch loss and PSNR. -->
<!-- SECTION:metrics end -->

## Bandwidth Sweep

<!-- SECTION:sweep start -->
<!-- Populated automatically with mean test PSNR per standard deviation. -->
<!-- SECTION:sweep end -->

## Predictions

<!-- SECTION:samples start -->
<!-- Predicted train and test images of the latest run. -->
<!-- SECTION:samples end -->

> Keep the `<!-- SECTION:name start/end -->` markers around any region that should be updated
> programmatically. Sections missing from the file are appended at the end.
";

#[derive(Clone, Debug)]
pub struct ReportSection {
    id: String,
    content: String,
}

impl ReportSection {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    fn start_marker(&self) -> String {
        format!("<!-- SECTION:{} start -->", self.id)
    }

    fn end_marker(&self) -> String {
        format!("<!-- SECTION:{} end -->", self.id)
    }

    fn body(&self) -> String {
        let trimmed = self.content.trim_matches('\n');
        if trimmed.is_empty() {
            "\n".to_owned()
        } else {
            format!("\n{trimmed}\n")
        }
    }
}

pub fn ensure_report_file(path: &Path, template: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    if !path.exists() {
        fs::write(path, template)
            .with_context(|| format!("failed to write report template to {}", path.display()))?;
    }

    Ok(())
}

pub fn update_sections(path: &Path, sections: &[ReportSection]) -> Result<()> {
    let mut content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report at {}", path.display()))?;

    for section in sections {
        content = replace_section(&content, section)?;
    }

    fs::write(path, content)
        .with_context(|| format!("failed to write updated report to {}", path.display()))?;
    Ok(())
}

fn replace_section(content: &str, section: &ReportSection) -> Result<String> {
    let start_marker = section.start_marker();
    let end_marker = section.end_marker();

    let Some(start_idx) = content.find(&start_marker) else {
        let mut appended = content.trim_end_matches('\n').to_owned();
        appended.push_str("\n\n");
        appended.push_str(&start_marker);
        appended.push_str(&section.body());
        appended.push_str(&end_marker);
        appended.push('\n');
        return Ok(appended);
    };

    let after_start = start_idx + start_marker.len();
    let end_relative = content[after_start..]
        .find(&end_marker)
        .ok_or_else(|| anyhow!("missing end marker: {}", end_marker))?;
    let end_idx = after_start + end_relative;

    let mut updated = String::with_capacity(content.len() + section.content.len());
    updated.push_str(&content[..start_idx]);
    updated.push_str(&start_marker);
    updated.push_str(&section.body());
    updated.push_str(&content[end_idx..]);
    Ok(updated)
}

pub fn render_configuration(params: &HyperParameters) -> String {
    let mapping = if params.gaussian {
        format!(
            "gaussian ({} units, std_dev {})",
            params.num_units_ffm, params.std_dev
        )
    } else {
        "basic".to_owned()
    };

    format!(
        "- Fourier mapping: {}\n- Hidden layers: {} x {} units\n- Output units: {}\n- Epochs: {}\n- Batch size: {}\n- Learning rate: {:.1e}\n- Adam betas: ({}, {}), epsilon {:.1e}\n- Seed: {}\n",
        mapping,
        params.num_layers,
        params.num_units,
        params.num_units_final,
        params.epochs,
        params.batch_size,
        params.learning_rate,
        params.beta_1,
        params.beta_2,
        params.epsilon,
        params.seed
    )
}

pub fn render_training(history: &[EpochMetrics], evaluation: &EvaluationMetrics) -> String {
    let mut output = String::new();
    let _ = writeln!(
        &mut output,
        "- Final train PSNR: {:.2} dB\n- Final test PSNR: {:.2} dB\n",
        evaluation.train_psnr, evaluation.test_psnr
    );

    if !history.is_empty() {
        let _ = writeln!(&mut output, "| Epoch | Loss | Train PSNR | Test PSNR |");
        let _ = writeln!(&mut output, "| --- | --- | --- | --- |");
        for metrics in summarize_history(history) {
            let _ = writeln!(
                &mut output,
                "| {} | {:.5} | {:.2} | {:.2} |",
                metrics.epoch, metrics.loss, metrics.train_psnr, metrics.test_psnr
            );
        }
    }

    output
}

pub fn render_sweep(result: &SweepResult) -> String {
    let mut output = String::new();
    let _ = writeln!(&mut output, "- Best std_dev: {}\n", result.best_std_dev);
    let _ = writeln!(&mut output, "| std_dev | Mean test PSNR | Per-image test PSNR |");
    let _ = writeln!(&mut output, "| --- | --- | --- |");
    for candidate in &result.candidates {
        let scores: Vec<String> = candidate
            .image_scores
            .iter()
            .map(|score| format!("{score:.2}"))
            .collect();
        let _ = writeln!(
            &mut output,
            "| {} | {:.2} | {} |",
            candidate.std_dev,
            candidate.mean_score,
            scores.join(", ")
        );
    }
    output
}

/// One embedded prediction image.
#[derive(Clone, Debug)]
pub struct SampleImage {
    pub title: String,
    pub data_url: String,
}

pub fn render_samples(samples: &[SampleImage]) -> String {
    if samples.is_empty() {
        return "No predictions recorded for this run.".to_owned();
    }

    let mut output = String::new();
    for sample in samples {
        let _ = writeln!(
            &mut output,
            "### {}\n\n![{}]({})\n",
            sample.title, sample.title, sample.data_url
        );
    }
    output
}

fn summarize_history(history: &[EpochMetrics]) -> Vec<&EpochMetrics> {
    let Some(last) = history.last() else {
        return Vec::new();
    };

    let mut checkpoints = vec![1, 5, 10, 25, 50, 100, 250, 500, last.epoch];
    checkpoints.retain(|&epoch| epoch <= last.epoch);
    checkpoints.sort_unstable();
    checkpoints.dedup();

    checkpoints
        .into_iter()
        .filter_map(|target| history.iter().find(|m| m.epoch == target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::CandidateScores;

    #[test]
    fn replaces_existing_sections_and_appends_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        ensure_report_file(&path, DEFAULT_REPORT_TEMPLATE).unwrap();

        update_sections(
            &path,
            &[
                ReportSection::new("configuration", "- Seed: 1\n"),
                ReportSection::new("extra", "custom notes"),
            ],
        )
        .unwrap();
        update_sections(&path, &[ReportSection::new("configuration", "- Seed: 2")]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(
            "<!-- SECTION:configuration start -->\n- Seed: 2\n<!-- SECTION:configuration end -->"
        ));
        assert!(!content.contains("- Seed: 1"));
        assert!(content
            .trim_end()
            .ends_with("<!-- SECTION:extra start -->\ncustom notes\n<!-- SECTION:extra end -->"));
    }

    #[test]
    fn missing_end_marker_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        fs::write(&path, "<!-- SECTION:sweep start -->\n").unwrap();
        assert!(update_sections(&path, &[ReportSection::new("sweep", "x")]).is_err());
    }

    #[test]
    fn sweep_table_lists_every_candidate() {
        let result = SweepResult {
            candidates: vec![
                CandidateScores {
                    std_dev: 1,
                    image_scores: vec![20.0, 22.0],
                    mean_score: 21.0,
                },
                CandidateScores {
                    std_dev: 2,
                    image_scores: vec![24.0, 26.0],
                    mean_score: 25.0,
                },
            ],
            best_std_dev: 2,
        };
        let rendered = render_sweep(&result);
        assert!(rendered.contains("- Best std_dev: 2"));
        assert!(rendered.contains("| 1 | 21.00 | 20.00, 22.00 |"));
        assert!(rendered.contains("| 2 | 25.00 | 24.00, 26.00 |"));
    }

    #[test]
    fn history_summary_keeps_checkpoints_and_last_epoch() {
        let history: Vec<EpochMetrics> = (1..=12)
            .map(|epoch| EpochMetrics {
                epoch,
                loss: 1.0 / epoch as f32,
                train_psnr: epoch as f32,
                test_psnr: epoch as f32,
            })
            .collect();
        let epochs: Vec<usize> = summarize_history(&history).iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![1, 5, 10, 12]);
    }
}
