use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::detection::census::{angle_spacing, mean_std, DigitCensus};
use crate::detection::classifier::DigitModel;
use crate::detection::contours::locate_face;
use crate::detection::digits::{classify_regions, DigitReading};
use crate::detection::hands::{measure_hands, HandReading};
use crate::detection::ink::{account_ink, fill_box, fill_corners, stroke_closed_curve, InkReport, PAPER};
use crate::detection::preprocessing::{preprocess, PreprocessedViews};
use crate::detection::regions::{dedup_boxes, detect_regions};
use crate::error::{Result, ScoringError};
use crate::models::{ClockFace, DetectorView, DigitBox, FeatureVector, ScoreRecord};
use crate::scoring::score;
use crate::store::{ImageStore, PersistedScore, ScoreSink};

/// Debug configuration for saving intermediate views
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Everything measured from one drawing, kept for inspection and rendering
#[derive(Debug, Clone)]
pub struct Analysis {
    pub views: PreprocessedViews,
    pub face: ClockFace,
    /// Boxes from all detector views before deduplication
    pub candidates: Vec<DigitBox>,
    pub boxes: Vec<DigitBox>,
    pub digits: DigitReading,
    pub census: DigitCensus,
    /// Threshold image with face outline, digits and hands painted out
    pub bleached: GrayImage,
    pub hands: HandReading,
    pub ink: InkReport,
    pub features: FeatureVector,
}

/// Result of scoring one image
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutcome {
    pub score: ScoreRecord,
    pub features: FeatureVector,
}

/// Clock drawing scorer: owns the digit model and the scoring policy.
///
/// Every call works on its own buffers, so one pipeline can score many
/// images from several threads.
pub struct Pipeline {
    model: Arc<dyn DigitModel>,
    config: ScoringConfig,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    /// Create a pipeline with the default policy
    pub fn new(model: Arc<dyn DigitModel>) -> Self {
        Self {
            model,
            config: ScoringConfig::default(),
            debug: None,
        }
    }

    /// Replace the scoring policy
    pub fn with_config(mut self, config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Enable debug mode with output directory
    /// Returns error if directory exists and is not empty
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(ScoringError::Config(format!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });
        Ok(self)
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one image
    pub fn run(&self, img: &DynamicImage) -> Result<ScoringOutcome> {
        Ok(self.score_analysis(self.analyze(img)?))
    }

    /// Score an image that has already been analyzed
    pub fn score_analysis(&self, analysis: Analysis) -> ScoringOutcome {
        let record = score(&analysis.features, &self.config.rubric);
        info!(
            "Score: contour={} numbers={} hand_length={} hand_centering={} aggregate={}",
            record.contour, record.numbers, record.hand_length, record.hand_centering, record.aggregate
        );
        ScoringOutcome {
            score: record,
            features: analysis.features,
        }
    }

    /// Measure one image without scoring it
    pub fn features(&self, img: &DynamicImage) -> Result<FeatureVector> {
        Ok(self.analyze(img)?.features)
    }

    /// Run every stage and keep the intermediate results
    pub fn analyze(&self, img: &DynamicImage) -> Result<Analysis> {
        let debug_dir = self
            .debug
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.output_dir.clone());
        self.analyze_into(img, debug_dir.as_deref())
    }

    fn analyze_into(&self, img: &DynamicImage, debug_dir: Option<&Path>) -> Result<Analysis> {
        let config = &self.config;

        let views = preprocess(img, &config.preprocess)?;
        save_debug(debug_dir, 1, "grayscale", &views.gray)?;
        save_debug(debug_dir, 2, "blurred", &views.blurred)?;
        save_debug(debug_dir, 3, "threshold", &views.threshold)?;
        save_debug(debug_dir, 4, "edges", &views.edges)?;

        let face = locate_face(&views.edges, &config.face)?;
        debug!(
            "Face: {:?} boundary, radius={:.1}, circularity={:.3}, radius_ratio={:.3}",
            face.kind,
            face.radius,
            face.boundary.circularity,
            face.boundary.radius_ratio()
        );

        // Stroke out the outline so digits touching it separate from the face
        let mut contour_removed = views.threshold.clone();
        stroke_closed_curve(&mut contour_removed, &face.primary, config.face.region_stroke, PAPER);
        save_debug(debug_dir, 5, "contour_removed", &contour_removed)?;

        let mut candidates = detect_regions(&views.gray, &config.regions, DetectorView::Grayscale);
        candidates.extend(detect_regions(&views.threshold, &config.regions, DetectorView::Threshold));
        candidates.extend(detect_regions(
            &contour_removed,
            &config.regions,
            DetectorView::ContourRemoved,
        ));
        let boxes = dedup_boxes(&candidates, config.regions.intersect_threshold);
        debug!("{} candidate boxes, {} after deduplication", candidates.len(), boxes.len());

        let digits = classify_regions(
            &views.threshold,
            &boxes,
            &face,
            self.model.as_ref(),
            &config.digits,
        )?;
        let census = DigitCensus::from_labels(digits.labels());
        debug!(
            "Digits: {} accepted, {} missing, {} extra",
            digits.detections.len(),
            census.missing,
            census.extra
        );

        let mut bleached = views.threshold.clone();
        stroke_closed_curve(&mut bleached, &face.boundary.points, config.face.bleach_stroke, PAPER);
        for detection in &digits.detections {
            fill_box(&mut bleached, &detection.bbox, PAPER);
        }
        save_debug(debug_dir, 6, "bleached", &bleached)?;

        let hands = measure_hands(&bleached, &face, &config.hands);
        save_debug(debug_dir, 7, "hand_mask", &hands.mask)?;

        if let Some(bbox) = hands.bbox {
            bleach_hand_box(&mut bleached, bbox);
        }
        let ink = account_ink(&views.threshold, &bleached, &views.gray);

        let features = assemble_features(&face, &digits, &census, &hands, &ink);
        Ok(Analysis {
            views,
            face,
            candidates,
            boxes,
            digits,
            census,
            bleached,
            hands,
            ink,
            features,
        })
    }

    /// Score independent images on `workers` threads.
    ///
    /// Results come back in input order, one per image.
    pub fn run_batch(&self, images: &[DynamicImage], workers: usize) -> Vec<Result<ScoringOutcome>> {
        let workers = workers.clamp(1, images.len().max(1));
        let (job_tx, job_rx) = mpsc::channel::<usize>();
        let (result_tx, result_rx) = mpsc::channel::<(usize, Result<ScoringOutcome>)>();
        let job_rx = Mutex::new(job_rx);

        for index in 0..images.len() {
            // The receiver outlives this loop, so sending cannot fail
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let result_tx = result_tx.clone();
                let job_rx = &job_rx;
                scope.spawn(move || {
                    loop {
                        let next = match job_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => return,
                        };
                        let Ok(index) = next else { return };
                        let outcome = self.run_indexed(&images[index], index);
                        if result_tx.send((index, outcome)).is_err() {
                            return;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<Result<ScoringOutcome>>> = images.iter().map(|_| None).collect();
        for (index, outcome) in result_rx {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(ScoringError::Io(std::io::Error::other("worker produced no result")))
                })
            })
            .collect()
    }

    /// Batch entry point: debug views go to a sub-directory per image
    fn run_indexed(&self, img: &DynamicImage, index: usize) -> Result<ScoringOutcome> {
        let debug_dir = self
            .debug
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.output_dir.join(format!("image_{:02}", index + 1)));
        Ok(self.score_analysis(self.analyze_into(img, debug_dir.as_deref())?))
    }

    /// Fetch, score and persist the drawing of one subtest
    pub fn score_subtest(
        &self,
        store: &dyn ImageStore,
        sink: &dyn ScoreSink,
        image_id: &str,
        subtest_id: i64,
    ) -> Result<ScoreRecord> {
        let bytes = store.fetch_image(image_id)?;
        let img = image::load_from_memory(&bytes)
            .map_err(|e| ScoringError::InvalidImage(format!("{}: {}", image_id, e)))?;

        let outcome = self.run(&img)?;
        sink.persist_score(&PersistedScore::new(subtest_id, &outcome.score))?;
        info!("Persisted score {} for subtest {}", outcome.score.aggregate, subtest_id);
        Ok(outcome.score)
    }
}

fn assemble_features(
    face: &ClockFace,
    digits: &DigitReading,
    census: &DigitCensus,
    hands: &HandReading,
    ink: &InkReport,
) -> FeatureVector {
    let center = face.center();
    let radius_stats = mean_std(&digits.radius_ratios());
    let area_stats = mean_std(&digits.areas());
    let spacing = angle_spacing(&digits.angles());

    FeatureVector {
        circularity: face.hull_circularity,
        radius_ratio: face.boundary.radius_ratio(),
        center_point: [center.x, center.y],
        removed_points: face.removed_points,
        radius: face.radius,
        center_deviation: face.center_deviation(),

        digit_radius_mean: radius_stats.map(|(m, _)| m),
        digit_radius_std: radius_stats.map(|(_, s)| s),
        digit_area_mean: area_stats.map(|(m, _)| m),
        digit_area_std: area_stats.map(|(_, s)| s),
        digit_angle_mean: spacing.map(|(m, _)| m),
        digit_angle_std: spacing.map(|(_, s)| s),
        extra_digits: census.extra,
        missing_digits: census.missing,

        hands_angle: hands.hands_angle(),
        density_ratio: hands.density_ratio(),
        bb_ratio: hands.bb_ratio(),
        length_ratio: hands.length_ratio(),
        intersect_distance: hands.intersect_distance(center),
        num_components: hands.has_ink().then_some(hands.num_components),

        leftover_ink: ink.leftover_ink,
        pen_pressure: ink.pen_pressure,
    }
}

/// Paint out the hand box `[x0, y0, x1, y1]` with `x1`/`y1` drawn too, the
/// same way digit boxes are painted out
fn bleach_hand_box(bleached: &mut GrayImage, [x0, y0, x1, y1]: [u32; 4]) {
    fill_corners(bleached, [x0, y0, x1, y1], PAPER);
}

/// Save one intermediate view as `NN_name/01.png` under the debug root
fn save_debug(root: Option<&Path>, step: usize, name: &str, img: &GrayImage) -> Result<()> {
    let Some(root) = root else {
        return Ok(());
    };
    let step_dir_name = format!("{:02}_{}", step, name);
    let step_dir = root.join(&step_dir_name);
    std::fs::create_dir_all(&step_dir)?;
    img.save(step_dir.join(format!("{:02}.png", 1)))?;
    debug!("Debug: saved {}/01.png", step_dir_name);
    Ok(())
}
