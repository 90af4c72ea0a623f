use std::f64::consts::PI;
use std::fmt::Write;

use super::{Figure, SeriesKind};

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;

/// Escape text for use in SVG content and attributes
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Short tick label: integers without decimals, others with up to 3
fn tick_label(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Data range mapped onto a pixel span
struct Scale {
    min: f64,
    max: f64,
    from: f64,
    to: f64,
}

impl Scale {
    fn new(min: f64, max: f64, from: f64, to: f64) -> Self {
        let (min, max) = if (max - min).abs() < f64::EPSILON {
            (min - 1.0, max + 1.0)
        } else {
            (min, max)
        };
        Self { min, max, from, to }
    }

    fn map(&self, v: f64) -> f64 {
        self.from + (v - self.min) / (self.max - self.min) * (self.to - self.from)
    }

    fn ticks(&self) -> Vec<f64> {
        let step = (self.max - self.min) / (TICKS - 1) as f64;
        (0..TICKS).map(|i| self.min + step * i as f64).collect()
    }
}

/// Bounds over every finite value, padded by 5%
fn bounds(values: impl Iterator<Item = f64>, include_zero: bool) -> (f64, f64) {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values.filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if include_zero {
        min = min.min(0.0);
        max = max.max(0.0);
    }
    if min > max {
        return (0.0, 1.0);
    }
    let pad = (max - min) * 0.05;
    (
        if include_zero && min == 0.0 { 0.0 } else { min - pad },
        if include_zero && max == 0.0 { 0.0 } else { max + pad },
    )
}

pub fn render_svg(figure: &Figure) -> String {
    let (w, h) = (figure.width, figure.height);
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(out, r#"<rect width="{w}" height="{h}" fill="white"/>"#);

    if let Some(title) = &figure.title {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="30" text-anchor="middle" font-size="16">{}</text>"#,
            w / 2.0,
            escape(title)
        );
    }

    let pie = figure
        .series
        .iter()
        .position(|s| matches!(s.kind, SeriesKind::Pie { .. }));
    match pie {
        Some(index) => render_pie(figure, index, &mut out),
        None => render_axes(figure, &mut out),
    }

    out.push_str("</svg>\n");
    out
}

fn render_pie(figure: &Figure, index: usize, out: &mut String) {
    let SeriesKind::Pie { labels, values } = &figure.series[index].kind else {
        return;
    };
    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return;
    }

    let (cx, cy) = (figure.width / 2.0, (figure.height + MARGIN_TOP) / 2.0);
    let r = (figure.width.min(figure.height - MARGIN_TOP) / 2.0 - 40.0).max(10.0);
    let mut angle = -PI / 2.0;

    for (i, value) in values.iter().enumerate() {
        if !value.is_finite() || *value <= 0.0 {
            continue;
        }
        let sweep = value / total * 2.0 * PI;
        let color = super::PALETTE[i % super::PALETTE.len()];
        let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
        let (x2, y2) = (
            cx + r * (angle + sweep).cos(),
            cy + r * (angle + sweep).sin(),
        );

        if sweep >= 2.0 * PI - 1e-9 {
            let _ = writeln!(out, r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" fill="{color}"/>"#);
        } else {
            let large = if sweep > PI { 1 } else { 0 };
            let _ = writeln!(
                out,
                r#"<path d="M {cx:.2} {cy:.2} L {x1:.2} {y1:.2} A {r:.2} {r:.2} 0 {large} 1 {x2:.2} {y2:.2} Z" fill="{color}" stroke="white"/>"#
            );
        }

        if let Some(label) = labels.get(i) {
            let mid = angle + sweep / 2.0;
            let _ = writeln!(
                out,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle">{}</text>"#,
                cx + (r + 18.0) * mid.cos(),
                cy + (r + 18.0) * mid.sin(),
                escape(label)
            );
        }
        angle += sweep;
    }
}

fn render_axes(figure: &Figure, out: &mut String) {
    let (w, h) = (figure.width, figure.height);
    let (left, right) = (MARGIN_LEFT, w - MARGIN_RIGHT);
    let (top, bottom) = (MARGIN_TOP, h - MARGIN_BOTTOM);

    // Bars share category slots; everything else plots on numeric axes
    let categories: Vec<&String> = figure
        .series
        .iter()
        .filter_map(|s| match &s.kind {
            SeriesKind::Bar { categories, .. } => Some(categories),
            _ => None,
        })
        .flatten()
        .fold(Vec::new(), |mut acc, c| {
            if !acc.contains(&c) {
                acc.push(c);
            }
            acc
        });
    let horizontal = figure
        .series
        .iter()
        .any(|s| matches!(s.kind, SeriesKind::Bar { horizontal: true, .. }));

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for series in &figure.series {
        match &series.kind {
            SeriesKind::Line { xs: x, ys: y, .. } | SeriesKind::Scatter { xs: x, ys: y } => {
                xs.extend(x);
                ys.extend(y);
            }
            SeriesKind::Bar { heights, .. } => ys.extend(heights),
            SeriesKind::Pie { .. } => {}
        }
    }

    let has_bars = !categories.is_empty();
    let (vmin, vmax) = bounds(ys.iter().copied(), has_bars);
    let slots = categories.len().max(1) as f64;
    let (xmin, xmax) = if has_bars {
        (-0.5, slots - 0.5)
    } else {
        bounds(xs.iter().copied(), false)
    };

    // Horizontal bars put categories on y and values on x
    let (xscale, yscale) = if horizontal {
        (Scale::new(vmin, vmax, left, right), Scale::new(xmin, xmax, top, bottom))
    } else {
        (Scale::new(xmin, xmax, left, right), Scale::new(vmin, vmax, bottom, top))
    };

    let value_scale = if horizontal { &xscale } else { &yscale };
    for tick in value_scale.ticks() {
        let p = value_scale.map(tick);
        let label = escape(&tick_label(tick));
        if horizontal {
            if figure.grid {
                let _ = writeln!(out, r##"<line x1="{p:.2}" y1="{top}" x2="{p:.2}" y2="{bottom}" stroke="#dddddd"/>"##);
            }
            let _ = writeln!(out, r#"<text x="{p:.2}" y="{}" text-anchor="middle">{label}</text>"#, bottom + 18.0);
        } else {
            if figure.grid {
                let _ = writeln!(out, r##"<line x1="{left}" y1="{p:.2}" x2="{right}" y2="{p:.2}" stroke="#dddddd"/>"##);
            }
            let _ = writeln!(out, r#"<text x="{}" y="{:.2}" text-anchor="end">{label}</text>"#, left - 6.0, p + 4.0);
        }
    }

    let _ = writeln!(
        out,
        r#"<path d="M {left} {top} L {left} {bottom} L {right} {bottom}" fill="none" stroke="black"/>"#
    );

    // Category or explicit tick labels
    let category_ticks: Vec<(f64, String)> = match &figure.xticks {
        Some((positions, labels)) => positions
            .iter()
            .zip(labels.iter().map(String::as_str).chain(std::iter::repeat("")))
            .map(|(p, l)| (*p, if l.is_empty() { tick_label(*p) } else { l.to_string() }))
            .collect(),
        None if has_bars => categories
            .iter()
            .enumerate()
            .map(|(i, c)| (i as f64, c.to_string()))
            .collect(),
        None => xscale.ticks().into_iter().map(|t| (t, tick_label(t))).collect(),
    };
    for (position, label) in category_ticks {
        let label = escape(&label);
        if horizontal {
            let p = yscale.map(position);
            let _ = writeln!(out, r#"<text x="{}" y="{:.2}" text-anchor="end">{label}</text>"#, left - 6.0, p + 4.0);
        } else {
            let p = xscale.map(position);
            let _ = writeln!(out, r#"<text x="{p:.2}" y="{}" text-anchor="middle">{label}</text>"#, bottom + 18.0);
        }
    }

    let bar_series = figure
        .series
        .iter()
        .filter(|s| matches!(s.kind, SeriesKind::Bar { .. }))
        .count()
        .max(1);
    let slot_px = if horizontal {
        (bottom - top) / slots
    } else {
        (right - left) / slots
    };
    let bar_px = slot_px * 0.8 / bar_series as f64;
    let mut bar_index = 0;

    for (i, series) in figure.series.iter().enumerate() {
        let color = figure.color_of(i);
        match &series.kind {
            SeriesKind::Line { xs, ys, marker, dashed } => {
                let points: Vec<String> = xs
                    .iter()
                    .zip(ys)
                    .filter(|(x, y)| x.is_finite() && y.is_finite())
                    .map(|(x, y)| format!("{:.2},{:.2}", xscale.map(*x), yscale.map(*y)))
                    .collect();
                let dash = if *dashed { r#" stroke-dasharray="6 4""# } else { "" };
                let _ = writeln!(
                    out,
                    r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"{dash}/>"#,
                    points.join(" ")
                );
                if *marker {
                    for point in &points {
                        let (x, y) = point.split_once(',').unwrap_or(("0", "0"));
                        let _ = writeln!(out, r#"<circle cx="{x}" cy="{y}" r="3" fill="{color}"/>"#);
                    }
                }
            }
            SeriesKind::Scatter { xs, ys } => {
                for (x, y) in xs.iter().zip(ys).filter(|(x, y)| x.is_finite() && y.is_finite()) {
                    let _ = writeln!(
                        out,
                        r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{color}" fill-opacity="0.8"/>"#,
                        xscale.map(*x),
                        yscale.map(*y)
                    );
                }
            }
            SeriesKind::Bar { categories: cats, heights, .. } => {
                for (category, value) in cats.iter().zip(heights).filter(|(_, v)| v.is_finite()) {
                    let slot = categories.iter().position(|c| *c == category).unwrap_or(0) as f64;
                    let offset = -slot_px * 0.4 + bar_px * bar_index as f64;
                    if horizontal {
                        let y = yscale.map(slot) + offset;
                        let (x0, x1) = (xscale.map(0.0), xscale.map(*value));
                        let _ = writeln!(
                            out,
                            r#"<rect x="{:.2}" y="{y:.2}" width="{:.2}" height="{bar_px:.2}" fill="{color}"/>"#,
                            x0.min(x1),
                            (x1 - x0).abs()
                        );
                    } else {
                        let x = xscale.map(slot) + offset;
                        let (y0, y1) = (yscale.map(0.0), yscale.map(*value));
                        let _ = writeln!(
                            out,
                            r#"<rect x="{x:.2}" y="{:.2}" width="{bar_px:.2}" height="{:.2}" fill="{color}"/>"#,
                            y0.min(y1),
                            (y1 - y0).abs()
                        );
                    }
                }
                bar_index += 1;
            }
            SeriesKind::Pie { .. } => {}
        }
    }

    if let Some(xlabel) = &figure.xlabel {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
            (left + right) / 2.0,
            h - 15.0,
            escape(xlabel)
        );
    }
    if let Some(ylabel) = &figure.ylabel {
        let y = (top + bottom) / 2.0;
        let _ = writeln!(
            out,
            r#"<text x="18" y="{y}" text-anchor="middle" transform="rotate(-90 18 {y})">{}</text>"#,
            escape(ylabel)
        );
    }

    if figure.legend {
        let mut row = 0.0;
        for (i, series) in figure.series.iter().enumerate() {
            let Some(label) = &series.label else { continue };
            let y = top + 10.0 + row * 18.0;
            let _ = writeln!(
                out,
                r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/><text x="{}" y="{}">{}</text>"#,
                right - 120.0,
                y - 10.0,
                figure.color_of(i),
                right - 102.0,
                y,
                escape(label)
            );
            row += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Figure, SeriesKind};

    fn bar_figure() -> Figure {
        let mut figure = Figure::default();
        figure.title = Some("Sales <2024>".to_string());
        figure.add(
            SeriesKind::Bar {
                categories: vec!["a".into(), "b".into()],
                heights: vec![3.0, -1.0],
                horizontal: false,
            },
            Some("units".into()),
            None,
        );
        figure
    }

    #[test]
    fn renders_well_formed_document() {
        let svg = render_svg(&bar_figure());
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("<rect").count(), 3);
    }

    #[test]
    fn escapes_text() {
        let svg = render_svg(&bar_figure());
        assert!(svg.contains("Sales &lt;2024&gt;"));
        assert!(!svg.contains("<2024>"));
    }

    #[test]
    fn legend_lists_labelled_series() {
        let mut figure = bar_figure();
        figure.legend = true;
        assert!(render_svg(&figure).contains(">units</text>"));
    }

    #[test]
    fn line_with_markers() {
        let mut figure = Figure::default();
        figure.add(
            SeriesKind::Line {
                xs: vec![0.0, 1.0, 2.0],
                ys: vec![1.0, f64::NAN, 3.0],
                marker: true,
                dashed: true,
            },
            None,
            Some("red".into()),
        );
        let svg = render_svg(&figure);
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("stroke-dasharray"));
        assert_eq!(svg.matches(r#"r="3""#).count(), 2);
    }

    #[test]
    fn pie_slices() {
        let mut figure = Figure::default();
        figure.add(
            SeriesKind::Pie {
                labels: vec!["x".into(), "y".into()],
                values: vec![1.0, 3.0],
            },
            None,
            None,
        );
        let svg = render_svg(&figure);
        assert_eq!(svg.matches("<path d=\"M").count(), 2);
        assert!(svg.contains(">x</text>"));
    }

    #[test]
    fn empty_figure_still_renders() {
        let svg = render_svg(&Figure::default());
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn tick_labels() {
        assert_eq!(tick_label(2.0), "2");
        assert_eq!(tick_label(0.125), "0.125");
        assert_eq!(tick_label(1.5), "1.5");
    }
}
