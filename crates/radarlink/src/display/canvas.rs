//! Drawing the radar view onto an abstract [`Surface`].
//!
//! Angles passed to a surface are in radians, measured the way raster
//! canvases measure them: zero points right and positive turns clockwise
//! (y grows downwards).

use std::f64::consts::{PI, TAU};

use chrono::{DateTime, Utc};

use super::DisplayState;
use crate::sample::{RANGE_MAX_CM, SWEEP_MAX_DEGREES};

/// Number of range rings.
pub const RING_COUNT: u32 = 4;
/// Spacing of radial guide lines in degrees.
pub const RADIAL_STEP_DEGREES: i32 = 30;

const BOTTOM_MARGIN: f64 = 50.0;
const DOT_RADIUS: f64 = 4.0;
const PULSE_RADIUS: f64 = 8.0;
const PULSE_AMPLITUDE: f64 = 2.0;
const LABEL_OFFSET: f64 = 15.0;
const LABEL_SIZE: f64 = 12.0;

/// A position on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Horizontal, left to right.
    pub x: f64,
    /// Vertical, top to bottom.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An sRGB colour with opacity in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Opacity.
    pub a: f64,
}

impl Rgba {
    /// Sweep and detection green.
    pub const GREEN: Self = Self::opaque(0x4a, 0xde, 0x80);
    /// Grid lines and rings.
    pub const GRID: Self = Self::opaque(0x1a, 0x4a, 0x54);
    /// Background.
    pub const BACKGROUND: Self = Self::opaque(0x0a, 0x0f, 0x1c);

    /// A fully opaque colour.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// The same colour with opacity `a`.
    #[must_use]
    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// `#rrggbb`, ignoring opacity.
    #[must_use]
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One colour stop of a [`ConicGradient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position as a fraction of a full turn.
    pub offset: f64,
    /// Colour at that position.
    pub color: Rgba,
}

/// Colour varying with angle around a centre.
#[derive(Debug, Clone, PartialEq)]
pub struct ConicGradient {
    /// Angle of offset zero, in radians.
    pub origin: f64,
    /// Stops in ascending offset order.
    pub stops: Vec<GradientStop>,
}

impl ConicGradient {
    /// The fading trail behind the sweep line.
    #[must_use]
    pub fn sweep_trail(origin: f64) -> Self {
        let stop = |offset, a| GradientStop {
            offset,
            color: Rgba::GREEN.with_alpha(a),
        };
        Self {
            origin,
            stops: vec![
                stop(0.0, 0.0),
                stop(0.1, 0.1),
                stop(0.2, 0.3),
                stop(0.3, 0.1),
                stop(1.0, 0.0),
            ],
        }
    }

    /// Interpolated colour at canvas angle `angle`.
    #[must_use]
    pub fn color_at(&self, angle: f64) -> Rgba {
        let fraction = (angle - self.origin).rem_euclid(TAU) / TAU;
        let Some(first) = self.stops.first() else {
            return Rgba::GREEN.with_alpha(0.0);
        };
        if fraction <= first.offset {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if fraction <= hi.offset {
                let span = hi.offset - lo.offset;
                let t = if span > 0.0 {
                    (fraction - lo.offset) / span
                } else {
                    1.0
                };
                return lerp(lo.color, hi.color, t);
            }
        }
        self.stops.last().map_or(first.color, |s| s.color)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lerp(a: Rgba, b: Rgba, t: f64) -> Rgba {
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * t).round() as u8;
    Rgba {
        r: mix(a.r, b.r),
        g: mix(a.g, b.g),
        b: mix(a.b, b.b),
        a: a.a + (b.a - a.a) * t,
    }
}

/// Drawing primitives the radar view needs.
pub trait Surface {
    /// Width and height in pixels.
    fn size(&self) -> (f64, f64);

    /// Fill the whole surface.
    fn clear(&mut self, color: Rgba);

    /// Stroke an arc from `start` to `end` (clockwise). A span of a full
    /// turn or more strokes a circle.
    fn stroke_arc(&mut self, center: Point, radius: f64, start: f64, end: f64, color: Rgba, width: f64);

    /// Stroke a straight line, optionally with a glow.
    fn line(&mut self, from: Point, to: Point, color: Rgba, width: f64, glow: bool);

    /// Fill a disc.
    fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba);

    /// Fill a pie slice from `start` to `end` with a conic gradient.
    fn fill_wedge(&mut self, center: Point, radius: f64, start: f64, end: f64, gradient: &ConicGradient);

    /// Draw text centred on `at`.
    fn text(&mut self, at: Point, text: &str, size: f64, color: Rgba);
}

/// Where the radar sits on a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarGeometry {
    /// Centre of the half-disc, near the bottom edge.
    pub center: Point,
    /// Radius of the outermost ring.
    pub radius: f64,
}

impl RadarGeometry {
    /// Layout for a `width` x `height` surface, or `None` if there is no
    /// room to draw.
    #[must_use]
    pub fn for_size(width: f64, height: f64) -> Option<Self> {
        let radius = width.min(height - 2.0 * BOTTOM_MARGIN) / 2.0;
        if !(width > 0.0 && height > 0.0 && radius > 0.0) {
            return None;
        }
        Some(Self {
            center: Point::new(width / 2.0, height - BOTTOM_MARGIN),
            radius,
        })
    }

    /// Canvas angle of the sweep direction `degrees`. Zero degrees points
    /// left and 90 points straight up.
    #[must_use]
    pub fn canvas_angle(degrees: f64) -> f64 {
        degrees.to_radians() + PI
    }

    /// Point at sweep angle `degrees` and pixel distance `r` from the centre.
    #[must_use]
    pub fn polar(&self, degrees: f64, r: f64) -> Point {
        let theta = Self::canvas_angle(degrees);
        Point::new(
            self.center.x + r * theta.cos(),
            self.center.y + r * theta.sin(),
        )
    }

    /// Pixel distance from the centre for a reading of `distance_cm`.
    #[must_use]
    pub fn scale(&self, distance_cm: u32) -> f64 {
        f64::from(distance_cm) / f64::from(RANGE_MAX_CM) * self.radius
    }
}

/// Draw one frame of `state` as of `now`.
///
/// Degenerate surfaces are left untouched.
pub fn render(state: &DisplayState, surface: &mut dyn Surface, now: DateTime<Utc>) {
    let (width, height) = surface.size();
    let Some(geo) = RadarGeometry::for_size(width, height) else {
        return;
    };

    surface.clear(Rgba::BACKGROUND);
    draw_grid(&geo, surface);
    draw_sweep(&geo, surface, state.current_angle());
    draw_detections(&geo, surface, state, now);
    draw_angle_labels(&geo, surface);
}

fn draw_grid(geo: &RadarGeometry, surface: &mut dyn Surface) {
    for i in 1..=RING_COUNT {
        let r = geo.radius * f64::from(i) / f64::from(RING_COUNT);
        surface.stroke_arc(geo.center, r, PI, TAU, Rgba::GRID, 1.0);
    }

    for deg in (0..=SWEEP_MAX_DEGREES).step_by(RADIAL_STEP_DEGREES.unsigned_abs() as usize) {
        let end = geo.polar(f64::from(deg), geo.radius);
        surface.line(geo.center, end, Rgba::GRID, 1.0, false);
    }

    for i in 1..=RING_COUNT {
        let r = geo.radius * f64::from(i) / f64::from(RING_COUNT);
        let label = format!("{}cm", RANGE_MAX_CM * i / RING_COUNT);
        surface.text(
            Point::new(geo.center.x, geo.center.y - r + 5.0),
            &label,
            LABEL_SIZE,
            Rgba::GREEN,
        );
    }
}

fn draw_sweep(geo: &RadarGeometry, surface: &mut dyn Surface, angle: i32) {
    let theta = RadarGeometry::canvas_angle(f64::from(angle));
    // The trail is the half-disc ending at the sweep line, with the gradient
    // measured from its perpendicular.
    let perpendicular = theta - PI / 2.0;
    surface.fill_wedge(
        geo.center,
        geo.radius,
        perpendicular - PI / 2.0,
        perpendicular + PI / 2.0,
        &ConicGradient::sweep_trail(perpendicular),
    );

    let tip = geo.polar(f64::from(angle), geo.radius);
    surface.line(geo.center, tip, Rgba::GREEN, 2.0, true);
}

fn draw_detections(geo: &RadarGeometry, surface: &mut dyn Surface, state: &DisplayState, now: DateTime<Utc>) {
    let phase = f64::from(now.timestamp_subsec_millis()) / 1000.0 * TAU;
    let pulse_radius = PULSE_RADIUS + PULSE_AMPLITUDE * phase.sin();
    let mut pulsed = false;

    for (rank, detection) in state.history().enumerate() {
        if !detection.sample.is_in_range() {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let opacity = (1.0 - 0.2 * rank as f64).max(0.2);
        let at = geo.polar(
            f64::from(detection.sample.angle),
            geo.scale(detection.sample.distance),
        );

        if !pulsed {
            surface.stroke_arc(
                at,
                pulse_radius,
                0.0,
                TAU,
                Rgba::GREEN.with_alpha(0.5 * opacity),
                2.0,
            );
            pulsed = true;
        }
        surface.fill_circle(at, DOT_RADIUS, Rgba::GREEN.with_alpha(opacity));
    }
}

fn draw_angle_labels(geo: &RadarGeometry, surface: &mut dyn Surface) {
    for deg in (0..=SWEEP_MAX_DEGREES).step_by(RADIAL_STEP_DEGREES.unsigned_abs() as usize) {
        let at = geo.polar(f64::from(deg), geo.radius + LABEL_OFFSET);
        surface.text(at, &format!("{deg}°"), LABEL_SIZE, Rgba::GREEN);
    }
}
