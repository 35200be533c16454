use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail};
use image::Rgb;
use ndarray::{ArrayD, ArrayView2, ArrayViewD, Axis};
use serde_json::Value;
use tract_onnx::prelude::*;

use super::{CamGenerator, Predictor};
use crate::models::{CamImage, NumericArray, Prediction};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn load_plan(path: &Path) -> anyhow::Result<OnnxPlan> {
    let plan = tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| anyhow!("failed to load ONNX model {}: {}", path.display(), e))?
        .into_optimized()
        .map_err(|e| anyhow!("failed to optimize ONNX model {}: {}", path.display(), e))?
        .into_runnable()
        .map_err(|e| anyhow!("failed to make ONNX model {} runnable: {}", path.display(), e))?;
    Ok(plan)
}

/// Runs the plan on `array` with a leading batch axis of 1 and returns the first output.
fn run_batched(plan: &OnnxPlan, array: &NumericArray) -> anyhow::Result<ArrayD<f32>> {
    let input: Tensor = array.clone().insert_axis(Axis(0)).into();
    let outputs = plan.run(tvec!(input.into())).map_err(|e| anyhow!("{}", e))?;
    let first = outputs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
    let view = first.to_array_view::<f32>().map_err(|e| anyhow!("{}", e))?;
    Ok(view.to_owned())
}

/// Reads a JSON array of label values, indexed by class.
pub fn load_labels(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read labels {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid labels file {}: {}", path.display(), e))
}

/// Classifier backed by an ONNX model producing one score per class.
pub struct OnnxPredictor {
    plan: OnnxPlan,
    labels: Option<Vec<Value>>,
}

impl OnnxPredictor {
    pub fn load(path: &Path, labels: Option<Vec<Value>>) -> anyhow::Result<Self> {
        Ok(Self {
            plan: load_plan(path)?,
            labels,
        })
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, array: &NumericArray) -> anyhow::Result<Prediction> {
        let scores: Vec<f32> = run_batched(&self.plan, array)?.iter().copied().collect();
        classify(&scores, self.labels.as_deref())
    }
}

/// Picks the top-scoring class. Its softmax probability must be a finite number.
fn classify(scores: &[f32], labels: Option<&[Value]>) -> anyhow::Result<Prediction> {
    let index = argmax(scores).ok_or_else(|| anyhow!("model produced an empty output"))?;
    let label = match labels {
        Some(labels) => labels.get(index).cloned().ok_or_else(|| {
            anyhow!("class index {} out of range for {} labels", index, labels.len())
        })?,
        None => Value::from(index),
    };

    let confidence = softmax_at(scores, index);
    if !confidence.is_finite() {
        bail!("model produced non-finite scores");
    }

    Ok(Prediction::new(label, confidence))
}

fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index)
}

/// Softmax probability of `scores[index]`.
fn softmax_at(scores: &[f32], index: usize) -> f64 {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let total: f64 = scores.iter().map(|&s| (s as f64 - max).exp()).sum();
    (scores[index] as f64 - max).exp() / total
}

/// CAM renderer backed by an ONNX model that outputs activation maps.
///
/// The last two output axes are height and width; every leading axis is
/// flattened into the sequence of frames.
pub struct OnnxCamGenerator {
    plan: OnnxPlan,
}

impl OnnxCamGenerator {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            plan: load_plan(path)?,
        })
    }
}

impl CamGenerator for OnnxCamGenerator {
    fn generate(&self, array: &NumericArray) -> anyhow::Result<Vec<CamImage>> {
        let maps = run_batched(&self.plan, array)?;
        render_maps(maps.view())
    }
}

fn render_maps(maps: ArrayViewD<f32>) -> anyhow::Result<Vec<CamImage>> {
    let shape = maps.shape().to_vec();
    let ndim = shape.len();
    if ndim < 2 {
        bail!("CAM output must have at least 2 axes, got shape {:?}", shape);
    }

    let (height, width) = (shape[ndim - 2], shape[ndim - 1]);
    let count: usize = shape[..ndim - 2].iter().product();
    let stacked = maps.to_shape((count, height, width))?;

    let (w, h) = (u32::try_from(width)?, u32::try_from(height)?);
    Ok(stacked.outer_iter().map(|map| render_map(map, w, h)).collect())
}

fn render_map(map: ArrayView2<f32>, width: u32, height: u32) -> CamImage {
    let (min, max) = map
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    CamImage::from_fn(width, height, |x, y| {
        let v = map[[y as usize, x as usize]];
        let t = if range > 0.0 { (v - min) / range } else { 0.0 };
        Rgb(jet(t))
    })
}

/// Jet colour map, `t` in `[0, 1]` from dark blue to dark red.
fn jet(t: f32) -> [u8; 3] {
    let channel = |offset: f32| ((1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(3.0), channel(2.0), channel(1.0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn argmax_picks_highest_score() {
        assert_eq!(argmax(&[0.1, 2.5, -1.0, 2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn softmax_confidence_is_a_probability() {
        let scores = [1.0, 3.0, 0.5];
        let p = softmax_at(&scores, 1);
        assert!(p > 0.5 && p < 1.0);

        let total: f64 = (0..scores.len()).map(|i| softmax_at(&scores, i)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn softmax_of_equal_scores_is_uniform() {
        assert!((softmax_at(&[4.0; 4], 2) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn classify_uses_labels_when_given() {
        let labels = vec![Value::from("intact"), Value::from("tear")];

        let prediction = classify(&[0.2, 1.7], Some(labels.as_slice())).unwrap();
        assert_eq!(prediction.label, Value::from("tear"));

        let prediction = classify(&[0.2, 1.7], None).unwrap();
        assert_eq!(prediction.label, Value::from(1));

        assert!(classify(&[0.2, 1.7, 3.0], Some(labels.as_slice())).is_err());
        assert!(classify(&[], None).is_err());
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        assert!(classify(&[f32::NEG_INFINITY; 3], None).is_err());
        assert!(classify(&[0.5, f32::NAN, 0.1], None).is_err());
    }

    #[test]
    fn jet_endpoints() {
        assert_eq!(jet(0.0), [0, 0, 128]);
        assert_eq!(jet(0.5), [128, 255, 128]);
        assert_eq!(jet(1.0), [128, 0, 0]);
    }

    #[test]
    fn renders_one_frame_per_leading_index() {
        let maps = Array::from_shape_fn(IxDyn(&[1, 3, 4, 5]), |idx| (idx[1] * 20 + idx[2] * 5 + idx[3]) as f32);
        let frames = render_maps(maps.view()).unwrap();

        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.dimensions(), (5, 4));
            assert_eq!(frame.get_pixel(0, 0), &Rgb([0, 0, 128]));
            assert_eq!(frame.get_pixel(4, 3), &Rgb([128, 0, 0]));
        }
    }

    #[test]
    fn single_map_renders_one_frame() {
        let maps = ArrayD::<f32>::zeros(IxDyn(&[6, 2]));
        let frames = render_maps(maps.view()).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dimensions(), (2, 6));
        assert!(frames[0].pixels().all(|p| *p == Rgb([0, 0, 128])));
    }

    #[test]
    fn rank_one_output_is_rejected() {
        let maps = ArrayD::<f32>::zeros(IxDyn(&[10]));
        assert!(render_maps(maps.view()).is_err());
    }
}
