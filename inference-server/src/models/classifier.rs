use {
    std::cmp::Ordering,
    anyhow::{Result, bail},
    rand::{Rng, SeedableRng, rngs::StdRng},
    tracing::info,
    crate::models::io::InputTensor,
};

pub const POOL_GRID: usize = 8;

pub trait ImageClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn num_classes(&self) -> usize;

    /// Runs the model over a batch of same-shaped inputs and returns one row of
    /// logits per input, in input order.
    fn forward(&self, batch: &[InputTensor]) -> Result<Vec<Vec<f32>>>;
}

impl ImageClassifier for Box<dyn ImageClassifier> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn forward(&self, batch: &[InputTensor]) -> Result<Vec<Vec<f32>>> {
        (**self).forward(batch)
    }
}

/// Average-pools every channel onto a fixed grid and applies one dense layer.
/// Weights come from a seeded generator, so the same seed always gives the
/// same model.
pub struct LinearClassifier {
    name: String,
    channels: usize,
    num_classes: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl LinearClassifier {
    pub fn new(name: &str, channels: usize, num_classes: usize, seed: u64) -> Self {
        info!("initializing {} with {} classes (seed {})", name, num_classes, seed);

        let features = channels * POOL_GRID * POOL_GRID;
        let scale = 1.0 / (features as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);

        Self {
            name: name.to_owned(),
            channels,
            num_classes,
            weights: (0..num_classes * features).map(|_| rng.gen_range(-scale..scale)).collect(),
            bias: (0..num_classes).map(|_| rng.gen_range(-0.1..0.1)).collect(),
        }
    }

    fn features(&self, input: &InputTensor) -> Vec<f32> {
        let cell_height = input.height() as f32 / POOL_GRID as f32;
        let cell_width = input.width() as f32 / POOL_GRID as f32;

        let mut features = vec![0.0; self.channels * POOL_GRID * POOL_GRID];
        let mut counts = vec![0usize; POOL_GRID * POOL_GRID];

        for y in 0..input.height() {
            let grid_y = ((y as f32 / cell_height) as usize).min(POOL_GRID - 1);
            for x in 0..input.width() {
                let grid_x = ((x as f32 / cell_width) as usize).min(POOL_GRID - 1);
                let cell = grid_y * POOL_GRID + grid_x;
                counts[cell] += 1;
                for channel in 0..self.channels {
                    features[channel * POOL_GRID * POOL_GRID + cell] += input.get(channel, y, x);
                }
            }
        }

        for channel in 0..self.channels {
            for cell in 0..POOL_GRID * POOL_GRID {
                features[channel * POOL_GRID * POOL_GRID + cell] /= counts[cell].max(1) as f32;
            }
        }

        features
    }
}

impl ImageClassifier for LinearClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(&self, batch: &[InputTensor]) -> Result<Vec<Vec<f32>>> {
        let shape = match batch.first() {
            Some(v) => v.shape(),
            None => return Ok(Vec::new()),
        };

        if shape[0] != self.channels {
            bail!("model expects {} channels, got input of shape {:?}", self.channels, shape);
        }
        if let Some(other) = batch.iter().find(|input| input.shape() != shape) {
            bail!("inputs in one batch must share a shape: {:?} vs {:?}", shape, other.shape());
        }

        Ok(batch.iter()
            .map(|input| {
                let features = self.features(input);
                self.weights
                    .chunks(features.len())
                    .zip(self.bias.iter())
                    .map(|(row, bias)| row.iter().zip(features.iter()).map(|(w, f)| w * f).sum::<f32>() + bias)
                    .collect()
            })
            .collect())
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Indices and values of the `k` largest entries, largest first.
pub fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    indexed.truncate(k);
    indexed
}
