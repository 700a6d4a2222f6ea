use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Which image view a candidate digit box was proposed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DetectorView {
    Grayscale,
    Threshold,
    ContourRemoved,
}

/// Axis-aligned box around an ink blob, in image coordinates.
///
/// `width`/`height` follow the bounding-rectangle convention: the box covers
/// columns `x..x + width` and rows `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DigitBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub view: DetectorView,
}

impl DigitBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32, view: DetectorView) -> Self {
        Self { x, y, width, height, view }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Same rectangle, regardless of which view proposed it
    pub fn same_rect(&self, other: &DigitBox) -> bool {
        self.rect_key() == other.rect_key()
    }

    pub fn rect_key(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }

    pub fn intersection_area(&self, other: &DigitBox) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) as u64 * (bottom - top) as u64
    }
}

/// Which approximation of the clock outline was chosen as the face boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CurveKind {
    Raw,
    Simplified,
    Hull,
}

/// A closed curve with its shape measurements
#[derive(Debug, Clone)]
pub struct ContourCandidate {
    pub points: Vec<Point<i32>>,
    /// Enclosed area (absolute value of the signed polygon area)
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    pub centroid: Point<f64>,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Set when the zeroth moment vanished and the centroid fell back to the
    /// image center
    pub degenerate_moment: bool,
}

impl ContourCandidate {
    pub fn radius_ratio(&self) -> f64 {
        if self.max_radius > 0.0 {
            self.min_radius / self.max_radius
        } else {
            0.0
        }
    }
}

/// The selected clock outline and the circle enclosing it
#[derive(Debug, Clone)]
pub struct ClockFace {
    pub boundary: ContourCandidate,
    pub kind: CurveKind,
    /// The unsimplified contour the boundary was derived from
    pub primary: Vec<Point<i32>>,
    pub circle_center: Point<f64>,
    pub radius: f64,
    /// Vertices removed by smoothing; zero unless the simplified curve won
    pub removed_points: u32,
    /// Circularity of the convex hull, reported whichever curve won
    pub hull_circularity: f64,
}

impl ClockFace {
    /// Reference point for all polar measurements
    pub fn center(&self) -> Point<f64> {
        self.boundary.centroid
    }

    pub fn center_deviation(&self) -> f64 {
        let dx = self.circle_center.x - self.boundary.centroid.x;
        let dy = self.circle_center.y - self.boundary.centroid.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

/// Index of the "not a digit" class in the classifier output
pub const GARBAGE_CLASS: usize = 10;
pub const NUM_CLASSES: usize = 11;

/// A box accepted as a digit
#[derive(Debug, Clone, Serialize)]
pub struct DigitDetection {
    pub bbox: DigitBox,
    pub label: u8,
    /// Classifier output fused with the angular prior; sums to one
    pub fused: [f32; NUM_CLASSES],
    /// Winning posterior after radial weighting
    pub posterior: f32,
    /// Degrees, counter-clockwise from the 3 o'clock direction
    pub angle: f64,
    pub radius_ratio: f64,
}

/// Every measurement taken from one drawing.
///
/// Absent values mean the stage that produces them degraded; the scorer
/// treats an absent input as a failed criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureVector {
    pub circularity: f64,
    pub radius_ratio: f64,
    pub center_point: [f64; 2],
    pub removed_points: u32,
    pub radius: f64,
    pub center_deviation: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_radius_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_radius_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_area_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_area_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_angle_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_angle_std: Option<f64>,
    pub extra_digits: u32,
    pub missing_digits: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hands_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "BBRatio")]
    pub bb_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersect_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_components: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leftover_ink: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pen_pressure: Option<f64>,
}

/// The four rubric criteria and their sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(rename = "Contour")]
    pub contour: u8,
    #[serde(rename = "Numbers")]
    pub numbers: u8,
    #[serde(rename = "Hand_Length")]
    pub hand_length: u8,
    #[serde(rename = "Hand_Centering")]
    pub hand_centering: u8,
    #[serde(rename = "Aggregate")]
    pub aggregate: u8,
}

impl ScoreRecord {
    pub fn new(contour: bool, numbers: bool, hand_length: bool, hand_centering: bool) -> Self {
        let scores = [contour, numbers, hand_length, hand_centering].map(u8::from);
        Self {
            contour: scores[0],
            numbers: scores[1],
            hand_length: scores[2],
            hand_centering: scores[3],
            aggregate: scores.iter().sum(),
        }
    }

    /// Sub-scores in rubric order
    pub fn scores(&self) -> [u8; 4] {
        [self.contour, self.numbers, self.hand_length, self.hand_centering]
    }

    /// Sub-scores as the response strings stored with the subtest
    pub fn responses(&self) -> Vec<String> {
        self.scores().iter().map(|s| s.to_string()).collect()
    }
}
