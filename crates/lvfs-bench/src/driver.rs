//! Experiment driver: grow the layer count and sample each one.

use std::path::PathBuf;

use indicatif::ProgressBar;
use serde::Serialize;

use crate::error::HarnessError;
use crate::fixture::Fixture;
use crate::mount::MountControl;
use crate::results::{ResultsSink, RunSummary, SampleRow};
use crate::sampler::Sampler;

/// The three experiment dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExperimentPlan {
    pub max_layers: usize,
    pub num_files: usize,
    pub num_samples: usize,
}

impl ExperimentPlan {
    pub fn validate(&self) -> Result<(), HarnessError> {
        for (name, value) in [
            ("maxLayers", self.max_layers),
            ("numFiles", self.num_files),
            ("numSamples", self.num_samples),
        ] {
            if value == 0 {
                return Err(HarnessError::Usage(format!("{name} must be a positive integer")));
            }
        }
        Ok(())
    }

    /// Mount/sample/unmount cycles in a full run.
    pub fn total_cycles(&self) -> u64 {
        (self.max_layers as u64) * (self.num_samples as u64)
    }
}

/// One experiment run. Owns its collaborators; consumed by [`run`](Self::run).
///
/// Strictly serial: for each layer count `1..=max_layers`, every sample is a
/// full mount -> measure -> unmount cycle, and the finished row is synced
/// to the results file before the next layer count starts.
pub struct Experiment<M: MountControl, S: Sampler> {
    plan: ExperimentPlan,
    fixture: Fixture,
    mount: M,
    sampler: S,
    output: PathBuf,
    progress: ProgressBar,
}

impl<M: MountControl, S: Sampler> Experiment<M, S> {
    pub fn new(
        plan: ExperimentPlan,
        fixture: Fixture,
        mount: M,
        sampler: S,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            plan,
            fixture,
            mount,
            sampler,
            output: output.into(),
            progress: ProgressBar::hidden(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(mut self) -> Result<RunSummary, HarnessError> {
        let plan = self.plan;
        plan.validate()?;

        self.fixture.ensure_base_fixture()?;
        let mut sink = ResultsSink::create(&self.output, plan.num_files, plan.num_samples)?;

        self.progress.set_length(plan.total_cycles());
        let mut rows = Vec::with_capacity(plan.max_layers);
        let mut failed_lookups = 0;

        for layer_count in 1..=plan.max_layers {
            self.fixture.ensure_layer_directory(layer_count - 1)?;
            let layers = self.fixture.layer_set(layer_count);
            self.progress.set_message(format!("{layer_count} layers"));

            let mut samples = Vec::with_capacity(plan.num_samples);
            for sample in 1..=plan.num_samples {
                self.mount.mount(&layers)?;
                let measured = self.sampler.measure();
                self.mount.unmount()?;
                let measurement = measured?;

                tracing::debug!(
                    "Layer count {} sample {}: {:?}",
                    layer_count,
                    sample,
                    measurement.elapsed
                );
                failed_lookups += measurement.failed_lookups;
                samples.push(measurement.seconds());
                self.progress.inc(1);
            }

            sink.append_row(layer_count, &samples)?;
            tracing::info!(
                "Layer count {}/{} done ({} samples)",
                layer_count,
                plan.max_layers,
                samples.len()
            );
            rows.push(SampleRow {
                layer_count,
                samples,
            });
        }

        let output = sink.close()?;
        self.progress.finish_and_clear();

        Ok(RunSummary {
            output,
            rows,
            failed_lookups,
        })
    }
}
