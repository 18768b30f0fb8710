use {
    std::{sync::Arc, time::{Duration, Instant}},
    config::Config,
    tracing::info,
    self::classifier::{ImageClassifier, LinearClassifier},
};

pub mod classifier;
pub mod executor;
pub mod io;
pub mod labels;

pub struct LoadedModel {
    pub model: Arc<dyn ImageClassifier>,
    pub load_time: Duration,
}

pub fn load_model(config: &Config) -> LoadedModel {
    let name = config.get_string("model.name").unwrap_or("linear-pool-8x8".to_owned());
    let seed = config.get_int("model.seed").unwrap_or(42) as u64;
    let num_classes = config.get_int("model.num_classes").unwrap_or(1000).max(1) as usize;

    info!("loading model {}", name);
    let started_at = Instant::now();
    let model: Arc<dyn ImageClassifier> = Arc::new(LinearClassifier::new(&name, 3, num_classes, seed));
    let load_time = started_at.elapsed();
    info!("model loaded in {:.2}s", load_time.as_secs_f64());

    LoadedModel {
        model,
        load_time,
    }
}
