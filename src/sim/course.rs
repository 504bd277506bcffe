//! Track geometry: a polyline of tape, thick landmark patches and a wall.
//!
//! Coordinates are millimetres, x east, y north. The standard course runs east,
//! loops back west through a half circle, and has a wall north of the return leg.
//! The wall is short enough to drive around its east end.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Patch {
    pub min: Point,
    pub max: Point,
}

impl Patch {
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    /// Tape centerline.
    pub path: Vec<Point>,
    pub line_width: f64,
    pub patches: Vec<Patch>,
    /// Solid block; only its south face is ever hit.
    pub wall: Patch,
}

/// Travel of the bump switch lever: it closes this far before the face.
pub const SWITCH_TRAVEL_MM: f64 = 0.5;

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

impl Course {
    /// Straight east, half circle to the left, straight back west.
    pub fn standard() -> Self {
        const STRAIGHT: f64 = 1_500.0;
        const RADIUS: f64 = 300.0;
        const ARC_STEPS: usize = 36;

        let mut path = vec![Point::new(-100.0, 0.0), Point::new(STRAIGHT, 0.0)];
        for i in 1..=ARC_STEPS {
            let a = -PI / 2.0 + PI * i as f64 / ARC_STEPS as f64;
            path.push(Point::new(STRAIGHT + RADIUS * a.cos(), RADIUS + RADIUS * a.sin()));
        }
        path.push(Point::new(-400.0, 2.0 * RADIUS));

        Self {
            path,
            line_width: 19.0,
            patches: vec![
                // diamond on the outbound leg
                Patch {
                    min: Point::new(700.0, -60.0),
                    max: Point::new(750.0, 60.0),
                },
                // start of the heading section on the return leg
                Patch {
                    min: Point::new(350.0, 2.0 * RADIUS - 60.0),
                    max: Point::new(400.0, 2.0 * RADIUS + 60.0),
                },
            ],
            wall: Patch {
                min: Point::new(-700.0, 1_300.0),
                max: Point::new(-100.0, 1_360.0),
            },
        }
    }

    pub fn distance_to_line(&self, p: Point) -> f64 {
        self.path
            .windows(2)
            .map(|w| distance_to_segment(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Dark fraction under a sensor of `footprint` radius centered at `p`, in `0..=1`.
    pub fn darkness(&self, p: Point, footprint: f64) -> f64 {
        if self.patches.iter().any(|patch| patch.contains(p)) {
            return 1.0;
        }
        let d = self.distance_to_line(p);
        ((self.line_width / 2.0 + footprint - d) / (2.0 * footprint)).clamp(0.0, 1.0)
    }

    pub fn wall_contact(&self, p: Point) -> bool {
        let wall = &self.wall;
        p.x >= wall.min.x && p.x <= wall.max.x && p.y >= wall.min.y - SWITCH_TRAVEL_MM && p.y <= wall.max.y
    }

    /// How far `p` has pushed past the south face of the wall, if at all.
    pub fn wall_penetration(&self, p: Point) -> Option<f64> {
        let depth = p.y - self.wall.min.y;
        (depth > 0.0 && self.wall.contains(p)).then_some(depth)
    }
}
