use image::GrayImage;
use tracing::debug;

use crate::config::RegionConfig;
use crate::models::{DetectorView, DigitBox};

/// One node of the component tree: a connected set of pixels at or below
/// `level`, alive until it merges into `parent`.
#[derive(Debug, Clone)]
struct RegionNode {
    level: u8,
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    parent: Option<usize>,
}

impl RegionNode {
    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Union-find over pixel indices carrying per-set area and bounds
struct Components {
    parent: Vec<u32>,
    area: Vec<u32>,
    bounds: Vec<[u32; 4]>,
    /// Last tree node emitted for a set
    node: Vec<Option<usize>>,
    /// Nodes absorbed into a set during the current level
    pending: Vec<Vec<usize>>,
    touched: Vec<bool>,
}

impl Components {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            area: vec![0; len],
            bounds: vec![[0; 4]; len],
            node: vec![None; len],
            pending: vec![Vec::new(); len],
            touched: vec![false; len],
        }
    }

    fn find(&mut self, mut i: u32) -> u32 {
        while self.parent[i as usize] != i {
            let grand = self.parent[self.parent[i as usize] as usize];
            self.parent[i as usize] = grand;
            i = grand;
        }
        i
    }

    /// Mark a set as changed this level, moving its last node into pending
    fn touch(&mut self, root: u32, touched_roots: &mut Vec<u32>) {
        let r = root as usize;
        if !self.touched[r] {
            self.touched[r] = true;
            if let Some(node) = self.node[r] {
                self.pending[r].push(node);
            }
            touched_roots.push(root);
        }
    }

    fn union(&mut self, a: u32, b: u32, touched_roots: &mut Vec<u32>) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        self.touch(ra, touched_roots);
        self.touch(rb, touched_roots);

        let (big, small) = if self.area[ra as usize] >= self.area[rb as usize] {
            (ra as usize, rb as usize)
        } else {
            (rb as usize, ra as usize)
        };
        self.parent[small] = big as u32;
        self.area[big] += self.area[small];
        let s = self.bounds[small];
        let b = &mut self.bounds[big];
        b[0] = b[0].min(s[0]);
        b[1] = b[1].min(s[1]);
        b[2] = b[2].max(s[2]);
        b[3] = b[3].max(s[3]);
        let moved = std::mem::take(&mut self.pending[small]);
        self.pending[big].extend(moved);
        self.node[small] = None;
    }
}

/// Build the dark-to-bright component tree of an image
fn component_tree(img: &GrayImage) -> Vec<RegionNode> {
    let (w, h) = img.dimensions();
    let len = (w * h) as usize;

    let mut by_level: Vec<Vec<u32>> = vec![Vec::new(); 256];
    for (x, y, p) in img.enumerate_pixels() {
        by_level[p[0] as usize].push(y * w + x);
    }

    let mut sets = Components::new(len);
    let mut active = vec![false; len];
    let mut nodes: Vec<RegionNode> = Vec::new();

    for (level, pixels) in by_level.iter().enumerate() {
        let mut touched_roots: Vec<u32> = Vec::new();
        for &idx in pixels {
            let (x, y) = (idx % w, idx / w);
            active[idx as usize] = true;
            sets.area[idx as usize] = 1;
            sets.bounds[idx as usize] = [x, y, x, y];
            sets.touch(idx, &mut touched_roots);

            let neighbors = [
                (x > 0).then(|| idx - 1),
                (x + 1 < w).then(|| idx + 1),
                (y > 0).then(|| idx - w),
                (y + 1 < h).then(|| idx + w),
            ];
            for n in neighbors.into_iter().flatten() {
                if active[n as usize] {
                    sets.union(idx, n, &mut touched_roots);
                }
            }
        }

        for &root in &touched_roots {
            sets.touched[root as usize] = false;
            if sets.find(root) != root {
                continue;
            }
            let r = root as usize;
            let [min_x, min_y, max_x, max_y] = sets.bounds[r];
            let id = nodes.len();
            nodes.push(RegionNode {
                level: level as u8,
                area: sets.area[r],
                min_x,
                min_y,
                max_x,
                max_y,
                parent: None,
            });
            for child in std::mem::take(&mut sets.pending[r]) {
                nodes[child].parent = Some(id);
            }
            sets.node[r] = Some(id);
        }
    }

    nodes
}

/// Area of the component containing `node` once the threshold reaches `level`
fn area_at(nodes: &[RegionNode], node: usize, level: u16) -> u32 {
    let mut current = node;
    while let Some(parent) = nodes[current].parent {
        if nodes[parent].level as u16 > level {
            break;
        }
        current = parent;
    }
    nodes[current].area
}

/// Maximally stable dark regions of `img`, as bounding boxes
fn stable_regions(img: &GrayImage, config: &RegionConfig, view: DetectorView) -> Vec<DigitBox> {
    let nodes = component_tree(img);
    let variation: Vec<f32> = (0..nodes.len())
        .map(|i| {
            let grown = area_at(&nodes, i, nodes[i].level as u16 + config.delta as u16);
            (grown - nodes[i].area) as f32 / nodes[i].area as f32
        })
        .collect();

    let mut child_min = vec![f32::INFINITY; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        if let Some(p) = node.parent {
            child_min[p] = child_min[p].min(variation[i]);
        }
    }

    let mut selected: Vec<usize> = (0..nodes.len())
        .filter(|&i| {
            let node = &nodes[i];
            node.area >= config.min_area
                && node.area <= config.max_area
                && variation[i] < config.max_variation
                && variation[i] <= child_min[i]
                && node.parent.is_none_or(|p| variation[i] <= variation[p])
        })
        .collect();

    // Nested regions too similar in size keep only the more stable one
    let mut dropped = vec![false; nodes.len()];
    let mut is_selected = vec![false; nodes.len()];
    for &i in &selected {
        is_selected[i] = true;
    }
    for &i in &selected {
        let mut ancestor = nodes[i].parent;
        while let Some(a) = ancestor {
            if is_selected[a] {
                let diversity = (nodes[a].area - nodes[i].area) as f32 / nodes[a].area as f32;
                if diversity < config.min_diversity {
                    if variation[a] <= variation[i] {
                        dropped[i] = true;
                    } else {
                        dropped[a] = true;
                    }
                }
                break;
            }
            ancestor = nodes[a].parent;
        }
    }
    selected.retain(|&i| !dropped[i]);

    selected
        .into_iter()
        .map(|i| {
            let n = &nodes[i];
            DigitBox::new(n.min_x, n.min_y, n.width(), n.height(), view)
        })
        .collect()
}

/// Stable regions of both polarities with oversized boxes discarded
pub fn detect_regions(img: &GrayImage, config: &RegionConfig, view: DetectorView) -> Vec<DigitBox> {
    let mut inverted = img.clone();
    image::imageops::invert(&mut inverted);

    let mut boxes = stable_regions(img, config, view);
    boxes.extend(stable_regions(&inverted, config, view));
    boxes.retain(|b| b.width <= config.max_box_side && b.height <= config.max_box_side);
    debug!("{:?} view: {} candidate boxes", view, boxes.len());
    boxes
}

/// Reduce a candidate list so that no two survivors overlap by
/// `threshold` or more of the smaller box's area.
///
/// Larger boxes win; equal areas are ordered by position, so the result does
/// not depend on input order. Identical rectangles collapse to one.
pub fn dedup_boxes(candidates: &[DigitBox], threshold: f32) -> Vec<DigitBox> {
    let mut ordered: Vec<DigitBox> = candidates.to_vec();
    ordered.sort_by(|a, b| {
        b.area()
            .cmp(&a.area())
            .then_with(|| a.rect_key().cmp(&b.rect_key()))
            .then_with(|| a.view.cmp(&b.view))
    });

    let mut kept: Vec<DigitBox> = Vec::new();
    for candidate in ordered {
        let conflicts = kept.iter().any(|k| {
            if k.same_rect(&candidate) {
                return true;
            }
            let smaller = k.area().min(candidate.area());
            smaller > 0
                && k.intersection_area(&candidate) as f64 >= threshold as f64 * smaller as f64
        });
        if !conflicts {
            kept.push(candidate);
        }
    }
    kept
}
