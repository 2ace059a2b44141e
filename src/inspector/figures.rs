//! Plain figure data produced by the inspector
//!
//! A figure is a title plus a grid of axes; each axes holds named series of
//! points (or a matrix for heat maps). Nothing here draws: the data is meant
//! to be written out as JSON and rendered by whatever tool is at hand.

use serde::Serialize;

/// How the series of an axes are meant to be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Line,
    Scatter,
    Bar,
    Heatmap,
}

/// One set of points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Per-point colour value (usually the loss).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec<f64>>,
}

impl Series {
    pub fn new(label: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            color: None,
        }
    }

    pub fn with_color(mut self, color: Vec<f64>) -> Self {
        self.color = Some(color);
        self
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// A single plot panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axes {
    pub title: String,
    pub kind: PlotKind,
    pub x_label: String,
    pub y_label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub x_ticks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub y_ticks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Series>,
    /// Row-major cell values of a heat map.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matrix: Vec<Vec<f64>>,
}

impl Axes {
    pub fn new(kind: PlotKind, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind,
            x_label: String::new(),
            y_label: String::new(),
            x_ticks: Vec::new(),
            y_ticks: Vec::new(),
            series: Vec::new(),
            matrix: Vec::new(),
        }
    }

    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }
}

/// Layout and title of a group of axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub rows: usize,
    pub cols: usize,
}

impl Figure {
    /// A figure laid out as a near-square grid for `n_axes` panels.
    pub fn grid(title: impl Into<String>, n_axes: usize) -> Self {
        let n = n_axes.max(1);
        let cols = (n as f64).sqrt().ceil() as usize;
        let rows = n.div_ceil(cols);
        Self {
            title: title.into(),
            rows,
            cols,
        }
    }
}

/// Serialised form of a figure with its axes.
#[derive(Debug, Serialize)]
pub(crate) struct FigureFile<'a> {
    pub figure: &'a Figure,
    pub axes: &'a [Axes],
}

/// Pearson correlation; `None` when either side has no spread.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
