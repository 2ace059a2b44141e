//! Read-only view over the trials of a finished (or running) study
//!
//! Downstream evaluation stages get one [`Inspector`] per optimisation stage
//! they list under `optimisations`. The plot methods return plain figure
//! data; [`Inspector::visualise`] writes all of it to disk as JSON.

pub mod figures;


use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::optimise::study_storage_read_only;
use crate::recipe::OptimisationSpec;
use crate::study::{best_of, Direction, FrozenTrial, Storage, StorageError, TrialState};

pub use figures::{Axes, Figure, PlotKind, Series};
use figures::{pearson, FigureFile};

/// Default output directory of [`Inspector::visualise`], below the stage directory.
pub const VISUALISATION_DIR: &str = "visualisation";

#[derive(Debug, Clone)]
pub struct Inspector {
    study_name: String,
    directions: Vec<Direction>,
    trials: Vec<FrozenTrial>,
    stage_dir: Option<PathBuf>,
}

impl Inspector {
    /// Build a view from trials already at hand.
    pub fn from_trials(
        study_name: &str,
        directions: Vec<Direction>,
        trials: Vec<FrozenTrial>,
    ) -> Self {
        Self {
            study_name: study_name.to_string(),
            directions,
            trials,
            stage_dir: None,
        }
    }

    /// Load every trial of `study_name` from `storage`.
    pub fn load(study_name: &str, storage: Arc<dyn Storage>) -> Result<Self, StorageError> {
        let record = storage
            .load_study(study_name)?
            .ok_or_else(|| StorageError::UnknownStudy(study_name.to_string()))?;
        let trials = storage.get_all_trials(record.id)?;
        debug!(
            study = study_name,
            trials = trials.len(),
            storage = %storage.describe(),
            "Loaded study for inspection"
        );
        Ok(Self::from_trials(&record.name, record.directions, trials))
    }

    /// Inspector for the study of an optimisation stage living in `stage_dir`.
    pub fn for_stage(spec: &OptimisationSpec, stage_dir: &Path) -> Result<Self> {
        let storage = study_storage_read_only(spec, stage_dir)?;
        let mut inspector = Self::load(&spec.study_name, storage)
            .with_context(|| format!("Failed to load study '{}'", spec.study_name))?;
        inspector.stage_dir = Some(stage_dir.to_path_buf());
        Ok(inspector)
    }

    pub fn study_name(&self) -> &str {
        &self.study_name
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// All trials, in trial-number order, whatever their state.
    pub fn trials(&self) -> &[FrozenTrial] {
        &self.trials
    }

    /// Complete trials carrying a value, in completion order.
    fn complete(&self) -> Vec<&FrozenTrial> {
        let mut complete: Vec<&FrozenTrial> = self
            .trials
            .iter()
            .filter(|t| t.state == TrialState::Complete && t.value().is_some())
            .collect();
        complete.sort_by_key(|t| (t.datetime_complete, t.number));
        complete
    }

    /// First objective value of each complete trial, in completion order.
    pub fn losses(&self) -> Vec<f64> {
        self.complete().iter().filter_map(|t| t.value()).collect()
    }

    /// Annotation `key` of each complete trial that has it.
    pub fn get_annotation_per_trial(&self, key: &str) -> Vec<Value> {
        self.complete()
            .iter()
            .filter_map(|t| t.user_attrs.get(key).cloned())
            .collect()
    }

    pub fn best_trial(&self) -> Option<FrozenTrial> {
        best_of(self.trials.clone(), &self.directions)
    }

    /// `(trial number, value)` of a parameter over the complete trials.
    ///
    /// Categorical values are given as the index of the chosen option.
    pub fn params_history(&self, name: &str) -> Vec<(u64, f64)> {
        self.complete()
            .iter()
            .filter_map(|t| t.numeric_param(name).map(|v| (t.number, v)))
            .collect()
    }

    /// Names of all parameters seen in complete trials.
    pub fn param_names(&self) -> Vec<String> {
        self.complete()
            .iter()
            .flat_map(|t| t.params.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `(parameter values, loss)` pairs of the trials that have the parameter.
    fn param_vs_loss(&self, name: &str) -> (Vec<f64>, Vec<f64>) {
        self.complete()
            .iter()
            .filter_map(|t| Some((t.numeric_param(name)?, t.value()?)))
            .unzip()
    }

    /// Share of each parameter in explaining the loss, largest first.
    ///
    /// The importance of a parameter is its absolute linear correlation with
    /// the loss, normalised so that all importances add up to one.
    pub fn importances(&self) -> Vec<(String, f64)> {
        let mut scores: Vec<(String, f64)> = self
            .param_names()
            .into_iter()
            .map(|name| {
                let (xs, ys) = self.param_vs_loss(&name);
                let score = pearson(&xs, &ys).map(f64::abs).unwrap_or(0.0);
                (name, score)
            })
            .collect();
        let total: f64 = scores.iter().map(|(_, s)| s).sum();
        if total > 0.0 {
            for (_, score) in &mut scores {
                *score /= total;
            }
        }
        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores
    }

    pub fn plot_importance(&self) -> (Figure, Vec<Axes>) {
        let importances = self.importances();
        let mut axes =
            Axes::new(PlotKind::Bar, "Parameter importance").labels("parameter", "importance");
        axes.x_ticks = importances.iter().map(|(n, _)| n.clone()).collect();
        axes.series.push(Series::new(
            "importance",
            (0..importances.len()).map(|i| i as f64).collect(),
            importances.iter().map(|(_, s)| *s).collect(),
        ));
        (Figure::grid(format!("{}: importance", self.study_name), 1), vec![axes])
    }

    /// One polyline per trial across all parameters and the loss, each
    /// column scaled to `[0, 1]`.
    pub fn plot_parallel_coordinates(&self) -> (Figure, Vec<Axes>) {
        let mut columns = self.param_names();
        let rows: Vec<(u64, f64, Vec<f64>)> = self
            .complete()
            .into_iter()
            .filter_map(|t| {
                let loss = t.value()?;
                let mut row = columns
                    .iter()
                    .map(|c| t.numeric_param(c))
                    .collect::<Option<Vec<f64>>>()?;
                row.push(loss);
                Some((t.number, loss, row))
            })
            .collect();
        columns.push("loss".to_string());

        let ranges: Vec<(f64, f64)> = (0..columns.len())
            .map(|c| {
                rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, _, r)| {
                    (lo.min(r[c]), hi.max(r[c]))
                })
            })
            .collect();

        let mut axes = Axes::new(PlotKind::Line, "Parallel coordinates").labels("", "scaled value");
        let x: Vec<f64> = (0..columns.len()).map(|i| i as f64).collect();
        for (number, loss, row) in &rows {
            let y = row
                .iter()
                .zip(&ranges)
                .map(|(v, (lo, hi))| if hi > lo { (v - lo) / (hi - lo) } else { 0.5 })
                .collect();
            axes.series.push(
                Series::new(format!("trial_{number}"), x.clone(), y)
                    .with_color(vec![*loss; columns.len()]),
            );
        }
        axes.x_ticks = columns;
        (
            Figure::grid(format!("{}: parallel coordinates", self.study_name), 1),
            vec![axes],
        )
    }

    /// Loss against each parameter, one panel per parameter.
    pub fn plot_slices(&self) -> (Figure, Vec<Axes>) {
        let axes: Vec<Axes> = self
            .param_names()
            .into_iter()
            .map(|name| {
                let (xs, ys) = self.param_vs_loss(&name);
                let mut axes = Axes::new(PlotKind::Scatter, name.clone()).labels(name.clone(), "loss");
                axes.series.push(Series::new(name, xs, ys));
                axes
            })
            .collect();
        (
            Figure::grid(format!("{}: slices", self.study_name), axes.len()),
            axes,
        )
    }

    /// Every pair of parameters against each other, coloured by the loss.
    pub fn plot_pairwise_scatter(&self) -> (Figure, Vec<Axes>) {
        let names = self.param_names();
        let complete = self.complete();
        let mut panels = Vec::new();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                let mut losses = Vec::new();
                for t in &complete {
                    if let (Some(x), Some(y), Some(loss)) =
                        (t.numeric_param(a), t.numeric_param(b), t.value())
                    {
                        xs.push(x);
                        ys.push(y);
                        losses.push(loss);
                    }
                }
                let mut axes =
                    Axes::new(PlotKind::Scatter, format!("{a} vs {b}")).labels(a.clone(), b.clone());
                axes.series
                    .push(Series::new(format!("{a}:{b}"), xs, ys).with_color(losses));
                panels.push(axes);
            }
        }
        (
            Figure::grid(format!("{}: pairwise scatter", self.study_name), panels.len()),
            panels,
        )
    }

    /// Correlation matrix over all parameters and the loss.
    ///
    /// Undefined correlations (no spread, fewer than two points) are 0.
    pub fn plot_correlations(&self) -> (Figure, Vec<Axes>) {
        let mut columns = self.param_names();
        columns.push("loss".to_string());
        let complete = self.complete();
        let column_value = |t: &FrozenTrial, c: usize| {
            if c + 1 == columns.len() {
                t.value()
            } else {
                t.numeric_param(&columns[c])
            }
        };

        let n = columns.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                if i == j {
                    *cell = 1.0;
                    continue;
                }
                let (xs, ys): (Vec<f64>, Vec<f64>) = complete
                    .iter()
                    .filter_map(|t| Some((column_value(t, i)?, column_value(t, j)?)))
                    .unzip();
                *cell = pearson(&xs, &ys).unwrap_or(0.0);
            }
        }

        let mut axes = Axes::new(PlotKind::Heatmap, "Correlations");
        axes.x_ticks = columns.clone();
        axes.y_ticks = columns;
        axes.matrix = matrix;
        (
            Figure::grid(format!("{}: correlations", self.study_name), 1),
            vec![axes],
        )
    }

    /// Loss and best-so-far loss over the trials, followed by one panel per
    /// parameter showing its sampled values over the trials.
    pub fn plot_loss_feature_history(&self) -> (Figure, Vec<Axes>) {
        let direction = self.directions.first().copied().unwrap_or_default();
        let complete = self.complete();

        let x: Vec<f64> = complete.iter().map(|t| t.number as f64).collect();
        let losses = self.losses();
        let mut best_so_far: Vec<f64> = Vec::with_capacity(losses.len());
        for &loss in &losses {
            let best = match best_so_far.last() {
                Some(&best) if !direction.is_better(loss, best) => best,
                _ => loss,
            };
            best_so_far.push(best);
        }

        let mut loss_axes = Axes::new(PlotKind::Line, "Loss history").labels("trial", "loss");
        loss_axes.series.push(Series::new("loss", x.clone(), losses));
        loss_axes.series.push(Series::new("best", x, best_so_far));

        let mut panels = vec![loss_axes];
        for name in self.param_names() {
            let (numbers, values): (Vec<f64>, Vec<f64>) = self
                .params_history(&name)
                .into_iter()
                .map(|(n, v)| (n as f64, v))
                .unzip();
            let mut axes = Axes::new(PlotKind::Line, name.clone()).labels("trial", name.clone());
            axes.series.push(Series::new(name, numbers, values));
            panels.push(axes);
        }
        (
            Figure::grid(format!("{}: loss and feature history", self.study_name), panels.len()),
            panels,
        )
    }

    /// Write every figure as `<out_dir>/<plot>.json`.
    ///
    /// `out_dir` defaults to `<stage_dir>/visualisation` for inspectors of a stage.
    pub fn visualise(&self, out_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
        let out_dir = match (out_dir, &self.stage_dir) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(stage_dir)) => stage_dir.join(VISUALISATION_DIR),
            (None, None) => {
                return Err(anyhow!(
                    "no output directory given for study '{}'",
                    self.study_name
                ))
            }
        };
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let plots = [
            ("importance", self.plot_importance()),
            ("parallel_coordinates", self.plot_parallel_coordinates()),
            ("slices", self.plot_slices()),
            ("pairwise_scatter", self.plot_pairwise_scatter()),
            ("correlations", self.plot_correlations()),
            ("loss_feature_history", self.plot_loss_feature_history()),
        ];

        let mut written = Vec::with_capacity(plots.len());
        for (name, (figure, axes)) in &plots {
            let path = out_dir.join(format!("{name}.json"));
            let json = serde_json::to_string_pretty(&FigureFile {
                figure,
                axes: axes.as_slice(),
            })?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        info!(
            study = %self.study_name,
            dir = %out_dir.display(),
            figures = written.len(),
            "Wrote figures"
        );
        Ok(written)
    }
}
