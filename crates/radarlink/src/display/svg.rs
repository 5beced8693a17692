//! SVG rendering target.

use std::f64::consts::TAU;
use std::fmt::Write;

use super::canvas::{ConicGradient, Point, Rgba, Surface};

/// Slices used to approximate a conic gradient.
const WEDGE_SLICES: u32 = 90;
/// Slices fainter than this are skipped.
const MIN_VISIBLE_ALPHA: f64 = 0.005;

/// A [`Surface`] that builds an SVG document.
#[derive(Debug, Clone)]
pub struct SvgSurface {
    width: f64,
    height: f64,
    body: String,
}

impl SvgSurface {
    /// Empty document of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: f64::from(width),
            height: f64::from(height),
            body: String::new(),
        }
    }

    /// The finished document.
    #[must_use]
    pub fn finish(self) -> String {
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
                r#"<defs><filter id="glow" x="-50%" y="-50%" width="200%" height="200%">"#,
                r#"<feGaussianBlur stdDeviation="3" result="blur"/>"#,
                r#"<feMerge><feMergeNode in="blur"/><feMergeNode in="SourceGraphic"/></feMerge>"#,
                r"</filter></defs>",
                "{body}</svg>\n"
            ),
            w = self.width,
            h = self.height,
            body = self.body,
        )
    }

    fn paint(kind: &str, color: Rgba) -> String {
        format!(r#"{kind}="{}" {kind}-opacity="{:.3}""#, color.hex(), color.a)
    }
}

fn arc_point(center: Point, radius: f64, angle: f64) -> Point {
    Point::new(
        center.x + radius * angle.cos(),
        center.y + radius * angle.sin(),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Surface for SvgSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        self.body.clear();
        let _ = write!(
            self.body,
            r#"<rect width="100%" height="100%" {}/>"#,
            Self::paint("fill", color)
        );
    }

    fn stroke_arc(&mut self, center: Point, radius: f64, start: f64, end: f64, color: Rgba, width: f64) {
        let stroke = Self::paint("stroke", color);
        if end - start >= TAU {
            let _ = write!(
                self.body,
                r#"<circle cx="{:.2}" cy="{:.2}" r="{radius:.2}" fill="none" {stroke} stroke-width="{width}"/>"#,
                center.x, center.y
            );
            return;
        }
        let from = arc_point(center, radius, start);
        let to = arc_point(center, radius, end);
        let large = u8::from(end - start > std::f64::consts::PI);
        let _ = write!(
            self.body,
            r#"<path d="M {:.2} {:.2} A {radius:.2} {radius:.2} 0 {large} 1 {:.2} {:.2}" fill="none" {stroke} stroke-width="{width}"/>"#,
            from.x, from.y, to.x, to.y
        );
    }

    fn line(&mut self, from: Point, to: Point, color: Rgba, width: f64, glow: bool) {
        let filter = if glow { r#" filter="url(#glow)""# } else { "" };
        let _ = write!(
            self.body,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" {} stroke-width="{width}"{filter}/>"#,
            from.x,
            from.y,
            to.x,
            to.y,
            Self::paint("stroke", color)
        );
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba) {
        let _ = write!(
            self.body,
            r#"<circle cx="{:.2}" cy="{:.2}" r="{radius:.2}" {}/>"#,
            center.x,
            center.y,
            Self::paint("fill", color)
        );
    }

    fn fill_wedge(&mut self, center: Point, radius: f64, start: f64, end: f64, gradient: &ConicGradient) {
        if end <= start {
            return;
        }
        let step = (end - start) / f64::from(WEDGE_SLICES);
        self.body.push_str("<g>");
        for i in 0..WEDGE_SLICES {
            let a0 = start + step * f64::from(i);
            let a1 = a0 + step;
            let color = gradient.color_at((a0 + a1) / 2.0);
            if color.a < MIN_VISIBLE_ALPHA {
                continue;
            }
            let p0 = arc_point(center, radius, a0);
            let p1 = arc_point(center, radius, a1);
            let _ = write!(
                self.body,
                r#"<path d="M {:.2} {:.2} L {:.2} {:.2} A {radius:.2} {radius:.2} 0 0 1 {:.2} {:.2} Z" {}/>"#,
                center.x,
                center.y,
                p0.x,
                p0.y,
                p1.x,
                p1.y,
                Self::paint("fill", color)
            );
        }
        self.body.push_str("</g>");
    }

    fn text(&mut self, at: Point, text: &str, size: f64, color: Rgba) {
        let _ = write!(
            self.body,
            r#"<text x="{:.2}" y="{:.2}" font-family="monospace" font-size="{size}" text-anchor="middle" dominant-baseline="middle" {}>{}</text>"#,
            at.x,
            at.y,
            Self::paint("fill", color),
            escape(text)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{render, DisplayState, Event};
    use crate::sample::Sample;
    use chrono::Utc;

    #[test]
    fn test_empty_document() {
        let svg = SvgSurface::new(800, 500).finish();
        assert!(svg.starts_with("<svg "));
        assert!(svg.contains(r#"width="800""#));
        assert!(svg.contains(r#"viewBox="0 0 800 500""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_rendered_frame() {
        let mut state = DisplayState::new();
        state.apply(Event::SampleArrived(Sample::new(90, 150)));

        let mut surface = SvgSurface::new(800, 500);
        render(&state, &mut surface, Utc::now());
        let svg = surface.finish();

        assert!(svg.contains(r##"fill="#0a0f1c""##));
        assert!(svg.contains(r##"stroke="#1a4a54""##));
        assert!(svg.contains(r#"filter="url(#glow)""#));
        assert!(svg.contains(">400cm</text>"));
        assert!(svg.contains(">90°</text>"));
        assert!(svg.contains("<g><path"));
    }

    #[test]
    fn test_clear_discards_previous_frame() {
        let mut surface = SvgSurface::new(10, 10);
        surface.text(Point::new(1.0, 1.0), "old", 10.0, Rgba::GREEN);
        surface.clear(Rgba::BACKGROUND);
        assert!(!surface.finish().contains("old"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut surface = SvgSurface::new(10, 10);
        surface.text(Point::new(1.0, 1.0), "<a&b>", 10.0, Rgba::GREEN);
        assert!(surface.finish().contains("&lt;a&amp;b&gt;"));
    }

    #[test]
    fn test_full_turn_arc_is_circle() {
        let mut surface = SvgSurface::new(10, 10);
        surface.stroke_arc(Point::new(5.0, 5.0), 2.0, 0.0, TAU, Rgba::GREEN, 1.0);
        let svg = surface.finish();
        assert!(svg.contains("<circle"));
        assert!(!svg.contains(" A "));
    }
}
