//! Safety corridors around committed paths.
//!
//! A corridor is the path's polyline buffered by the safety radius with
//! rounded caps and joins. It is stored as one capsule per segment; their
//! union is exactly the rounded buffer. Areas are integrated along horizontal
//! scanlines: each capsule cuts a scanline in one exact interval, so the only
//! approximation is the scanline spacing.

use serde::{Deserialize, Serialize};

use crate::error::{ArbiterError, Result};
use crate::models::Path;
use crate::projection::{PlanarPoint, UtmProjection};

/// Default scanline spacing in meters.
pub const DEFAULT_SAMPLE_STEP_M: f64 = 0.25;

/// Finest scanline spacing accepted by [`CorridorBuilder::new`].
pub const MIN_SAMPLE_STEP_M: f64 = 0.01;

const EPS_M: f64 = 1e-9;

/// Axis-aligned planar bounding box in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            minx: f64::INFINITY,
            miny: f64::INFINITY,
            maxx: f64::NEG_INFINITY,
            maxy: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, x: f64, y: f64) {
        self.minx = self.minx.min(x);
        self.miny = self.miny.min(y);
        self.maxx = self.maxx.max(x);
        self.maxy = self.maxy.max(y);
    }

    fn is_empty(&self) -> bool {
        self.minx > self.maxx || self.miny > self.maxy
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.minx <= other.maxx
            && other.minx <= self.maxx
            && self.miny <= other.maxy
            && other.miny <= self.maxy
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bounds {
            minx: self.minx.max(other.minx),
            miny: self.miny.max(other.miny),
            maxx: self.maxx.min(other.maxx),
            maxy: self.maxy.min(other.maxy),
        })
    }
}

/// Region shared by two corridors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub area_m2: f64,
    pub bounds: Bounds,
}

/// One buffered segment.
#[derive(Debug, Clone, Copy)]
struct Capsule {
    a: PlanarPoint,
    b: PlanarPoint,
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
}

impl Capsule {
    fn new(a: PlanarPoint, b: PlanarPoint, radius_m: f64) -> Self {
        Self {
            a,
            b,
            minx: a.x.min(b.x) - radius_m,
            miny: a.y.min(b.y) - radius_m,
            maxx: a.x.max(b.x) + radius_m,
            maxy: a.y.max(b.y) + radius_m,
        }
    }

    fn boxes_touch(&self, other: &Capsule) -> bool {
        self.minx <= other.maxx
            && other.minx <= self.maxx
            && self.miny <= other.maxy
            && other.miny <= self.maxy
    }

    /// Interval where the horizontal line at `y` crosses this capsule.
    ///
    /// The capsule is the union of the two end disks and the segment's side
    /// rectangle; being convex, its cut is the hull of the three cuts.
    fn span_at(&self, y: f64, radius_m: f64) -> Option<(f64, f64)> {
        if y < self.miny || y > self.maxy {
            return None;
        }

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        for center in [self.a, self.b] {
            let dy = y - center.y;
            if dy.abs() <= radius_m {
                let half = (radius_m * radius_m - dy * dy).max(0.0).sqrt();
                lo = lo.min(center.x - half);
                hi = hi.max(center.x + half);
            }
        }

        let dx = self.b.x - self.a.x;
        let dy = self.b.y - self.a.y;
        let len = dx.hypot(dy);
        if len > EPS_M {
            let nx = -dy / len * radius_m;
            let ny = dx / len * radius_m;
            let corners = [
                PlanarPoint::new(self.a.x + nx, self.a.y + ny),
                PlanarPoint::new(self.b.x + nx, self.b.y + ny),
                PlanarPoint::new(self.b.x - nx, self.b.y - ny),
                PlanarPoint::new(self.a.x - nx, self.a.y - ny),
            ];
            for i in 0..corners.len() {
                let p = corners[i];
                let q = corners[(i + 1) % corners.len()];
                if (p.y - y) * (q.y - y) > 0.0 {
                    continue;
                }
                if (q.y - p.y).abs() <= EPS_M {
                    lo = lo.min(p.x.min(q.x));
                    hi = hi.max(p.x.max(q.x));
                } else {
                    let t = (y - p.y) / (q.y - p.y);
                    let x = p.x + t * (q.x - p.x);
                    lo = lo.min(x);
                    hi = hi.max(x);
                }
            }
        }

        (lo <= hi).then_some((lo, hi))
    }
}

/// Buffered planar region around a non-degenerate path.
#[derive(Debug, Clone)]
pub struct Corridor {
    capsules: Vec<Capsule>,
    radius_m: f64,
    step_m: f64,
    bounds: Bounds,
    length_m: f64,
}

impl Corridor {
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Planar length of the centerline.
    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// Area of the corridor itself.
    pub fn area_m2(&self) -> f64 {
        let mut sweep = RowSweep::new(self.capsules.iter().collect());
        let mut area = 0.0;
        for_each_row(self.bounds.miny, self.bounds.maxy, self.step_m, |y, h| {
            let spans = merged_spans(sweep.at(y), y, self.radius_m);
            area += spans.iter().map(|(lo, hi)| hi - lo).sum::<f64>() * h;
        });
        area
    }

    /// Area and extent of the region shared with `other`, if any.
    ///
    /// Only rows inside bands where a capsule of each corridor can meet are
    /// integrated, so the cost follows the shared region rather than the
    /// corridors' combined extent.
    pub fn overlap(&self, other: &Corridor) -> Option<Overlap> {
        let window = self.bounds.intersection(&other.bounds)?;
        let mine = self.capsules_in(&window);
        let theirs = other.capsules_in(&window);
        let bands = shared_bands(&mine, &theirs);
        if bands.is_empty() {
            return None;
        }

        let step = self.step_m.min(other.step_m);
        let mut area = 0.0;
        let mut hit = Bounds::empty();
        let mut mine = RowSweep::new(mine);
        let mut theirs = RowSweep::new(theirs);

        for (band_lo, band_hi) in bands {
            for_each_row(band_lo, band_hi, step, |y, h| {
                let a = merged_spans(mine.at(y), y, self.radius_m);
                if a.is_empty() {
                    return;
                }
                let b = merged_spans(theirs.at(y), y, other.radius_m);
                let (mut i, mut j) = (0, 0);
                while i < a.len() && j < b.len() {
                    let lo = a[i].0.max(b[j].0);
                    let hi = a[i].1.min(b[j].1);
                    if hi > lo {
                        area += (hi - lo) * h;
                        hit.include(lo, y - h / 2.0);
                        hit.include(hi, y + h / 2.0);
                    }
                    if a[i].1 < b[j].1 {
                        i += 1;
                    } else {
                        j += 1;
                    }
                }
            });
        }

        if area <= 0.0 || hit.is_empty() {
            return None;
        }
        Some(Overlap {
            area_m2: area,
            bounds: hit,
        })
    }

    fn capsules_in(&self, window: &Bounds) -> Vec<&Capsule> {
        self.capsules
            .iter()
            .filter(|c| c.maxy >= window.miny && c.miny <= window.maxy)
            .filter(|c| c.maxx >= window.minx && c.minx <= window.maxx)
            .collect()
    }
}

/// Disjoint y ranges, ascending, where some capsule of `mine` and some
/// capsule of `theirs` have touching bounding boxes.
fn shared_bands(mine: &[&Capsule], theirs: &[&Capsule]) -> Vec<(f64, f64)> {
    let mut theirs = theirs.to_vec();
    theirs.sort_by(|a, b| a.miny.total_cmp(&b.miny));

    let mut bands = Vec::new();
    for a in mine {
        for b in theirs.iter().take_while(|b| b.miny <= a.maxy) {
            if a.boxes_touch(b) {
                bands.push((a.miny.max(b.miny), a.maxy.min(b.maxy)));
            }
        }
    }
    if bands.is_empty() {
        return bands;
    }
    bands.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(bands.len());
    for (lo, hi) in bands {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Capsules that can cut the current row. Rows must be visited in
/// ascending `y`.
struct RowSweep<'a> {
    pending: Vec<&'a Capsule>,
    next: usize,
    active: Vec<&'a Capsule>,
}

impl<'a> RowSweep<'a> {
    fn new(mut capsules: Vec<&'a Capsule>) -> Self {
        capsules.sort_by(|a, b| a.miny.total_cmp(&b.miny));
        Self {
            pending: capsules,
            next: 0,
            active: Vec::new(),
        }
    }

    fn at(&mut self, y: f64) -> &[&'a Capsule] {
        while let Some(&capsule) = self.pending.get(self.next) {
            if capsule.miny > y {
                break;
            }
            self.active.push(capsule);
            self.next += 1;
        }
        self.active.retain(|c| c.maxy >= y);
        &self.active
    }
}

/// Visit scanline rows covering `lo..hi`, passing the row center and height.
fn for_each_row(lo: f64, hi: f64, step: f64, mut visit: impl FnMut(f64, f64)) {
    let rows = ((hi - lo) / step).ceil();
    if rows.is_nan() || rows < 1.0 {
        return;
    }
    for i in 0..rows as usize {
        let row_lo = lo + i as f64 * step;
        let h = step.min(hi - row_lo);
        if h <= 0.0 {
            break;
        }
        visit(row_lo + h / 2.0, h);
    }
}

fn merged_spans(capsules: &[&Capsule], y: f64, radius_m: f64) -> Vec<(f64, f64)> {
    let mut spans: Vec<(f64, f64)> = capsules
        .iter()
        .filter_map(|c| c.span_at(y, radius_m))
        .collect();
    if spans.len() < 2 {
        return spans;
    }
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(spans.len());
    for (lo, hi) in spans {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Builds corridors at a fixed safety radius through a fixed projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorBuilder {
    projection: UtmProjection,
    radius_m: f64,
    sample_step_m: f64,
}

impl CorridorBuilder {
    /// A non-positive radius or a step finer than [`MIN_SAMPLE_STEP_M`] is a
    /// configuration error.
    pub fn new(projection: UtmProjection, radius_m: f64, sample_step_m: f64) -> Result<Self> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ArbiterError::InvalidRadius(radius_m));
        }
        if !sample_step_m.is_finite() || sample_step_m < MIN_SAMPLE_STEP_M {
            return Err(ArbiterError::InvalidSampleStep(sample_step_m));
        }
        Ok(Self {
            projection,
            radius_m,
            sample_step_m,
        })
    }

    pub fn projection(&self) -> &UtmProjection {
        &self.projection
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn sample_step_m(&self) -> f64 {
        self.sample_step_m
    }

    /// Corridor for `path`, or `None` when the path is degenerate.
    pub fn build(&self, path: &Path) -> Result<Option<Corridor>> {
        if path.is_degenerate() {
            return Ok(None);
        }
        let planar = self.projection.project_all(path.points())?;
        Ok(self.from_planar(&planar))
    }

    /// Corridor around already-projected points.
    pub fn from_planar(&self, points: &[PlanarPoint]) -> Option<Corridor> {
        if points.len() < 2 {
            return None;
        }

        let mut bounds = Bounds::empty();
        for p in points {
            bounds.include(p.x - self.radius_m, p.y - self.radius_m);
            bounds.include(p.x + self.radius_m, p.y + self.radius_m);
        }

        let capsules = points
            .windows(2)
            .map(|pair| Capsule::new(pair[0], pair[1], self.radius_m))
            .collect();
        let length_m = points.windows(2).map(|pair| pair[0].distance(&pair[1])).sum();

        Some(Corridor {
            capsules,
            radius_m: self.radius_m,
            step_m: self.sample_step_m,
            bounds,
            length_m,
        })
    }
}
