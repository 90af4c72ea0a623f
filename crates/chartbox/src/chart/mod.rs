//! Figure model behind the plotting namespace
//!
//! Plotting calls accumulate series on the current [`Figure`]; `savefig`
//! renders it to SVG with [`render_svg`]. Nothing here touches the
//! filesystem.

mod svg;

pub use svg::render_svg;

/// Default figure size in pixels (matplotlib's 6.4in x 4.8in at 100 dpi)
pub const DEFAULT_SIZE: (f64, f64) = (640.0, 480.0);

/// Largest figure edge, in pixels
pub const MAX_EDGE: f64 = 4000.0;

/// matplotlib's default colour cycle
pub const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesKind {
    Line {
        xs: Vec<f64>,
        ys: Vec<f64>,
        marker: bool,
        dashed: bool,
    },
    Bar {
        categories: Vec<String>,
        heights: Vec<f64>,
        horizontal: bool,
    },
    Scatter {
        xs: Vec<f64>,
        ys: Vec<f64>,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub kind: SeriesKind,
    pub label: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width: f64,
    pub height: f64,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub series: Vec<Series>,
    pub legend: bool,
    pub grid: bool,
    /// Explicit x tick positions and labels
    pub xticks: Option<(Vec<f64>, Vec<String>)>,
}

impl Default for Figure {
    fn default() -> Self {
        Self::with_size(DEFAULT_SIZE.0, DEFAULT_SIZE.1)
    }
}

impl Figure {
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            width: width.clamp(100.0, MAX_EDGE),
            height: height.clamp(100.0, MAX_EDGE),
            title: None,
            xlabel: None,
            ylabel: None,
            series: Vec::new(),
            legend: false,
            grid: false,
            xticks: None,
        }
    }

    pub fn add(&mut self, kind: SeriesKind, label: Option<String>, color: Option<String>) {
        self.series.push(Series {
            kind,
            label,
            color: color.filter(|c| is_safe_color(c)),
        });
    }

    /// Colour of series `index`, falling back to the palette
    pub fn color_of(&self, index: usize) -> &str {
        self.series
            .get(index)
            .and_then(|s| s.color.as_deref())
            .unwrap_or(PALETTE[index % PALETTE.len()])
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty() && self.title.is_none()
    }
}

/// Accept `#rgb`, `#rrggbb` and plain colour names; anything else could
/// break out of an SVG attribute
pub fn is_safe_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !color.is_empty() && color.len() <= 32 && color.chars().all(|c| c.is_ascii_alphabetic()),
    }
}

/// Open figures of one run
#[derive(Debug, Default)]
pub struct Figures {
    current: Option<Figure>,
}

impl Figures {
    /// Current figure, created on first use
    pub fn current(&mut self) -> &mut Figure {
        self.current.get_or_insert_with(Figure::default)
    }

    /// Start a new figure, discarding the current one
    pub fn open(&mut self, width: f64, height: f64) -> &mut Figure {
        self.current.insert(Figure::with_size(width, height))
    }

    pub fn close(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_figure_is_created_lazily() {
        let mut figures = Figures::default();
        figures.current().title = Some("t".to_string());
        assert_eq!(figures.current().title.as_deref(), Some("t"));
        figures.close();
        assert!(figures.current().title.is_none());
    }

    #[test]
    fn figure_size_is_clamped() {
        let mut figures = Figures::default();
        let figure = figures.open(1e9, 1.0);
        assert_eq!(figure.width, MAX_EDGE);
        assert_eq!(figure.height, 100.0);
    }

    #[test]
    fn unsafe_colors_fall_back_to_palette() {
        let mut figure = Figure::default();
        figure.add(
            SeriesKind::Scatter { xs: vec![], ys: vec![] },
            None,
            Some("red\" onload=\"x".to_string()),
        );
        figure.add(SeriesKind::Scatter { xs: vec![], ys: vec![] }, None, Some("#0a0".to_string()));
        assert_eq!(figure.color_of(0), PALETTE[0]);
        assert_eq!(figure.color_of(1), "#0a0");
    }

    #[test]
    fn color_validation() {
        assert!(is_safe_color("steelblue"));
        assert!(is_safe_color("#FFAA00"));
        assert!(!is_safe_color("#GG0000"));
        assert!(!is_safe_color("url(#x)"));
        assert!(!is_safe_color(""));
    }
}
