use sgd_neurons::data::{InputInfo, Target, TrainingRow};
use sgd_neurons::params::{Activation, Params};
use sgd_neurons::{Chain, ModelInfo, Pass, PassReport};

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use std::error::Error;
use std::{env, fs, thread};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WORKERS: usize = 4;
const EPOCHS: u64 = 10;

/// Points on a noisy unit circle; the class is whether the point lies in
/// the first or third quadrant.
fn generate_data(num_samples: usize, seed: u64) -> Result<Vec<TrainingRow>, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let radians = Uniform::new(0.0, 2.0 * std::f64::consts::PI);
    let noise = Normal::new(0.0, 0.1)?;

    let data = (0..num_samples)
        .map(|_| {
            let theta = radians.sample(&mut rng);
            let point = vec![theta.cos() + noise.sample(&mut rng), theta.sin() + noise.sample(&mut rng)];
            let class = if point[0] * point[1] > 0.0 { 0 } else { 1 };
            TrainingRow::new(point, Target::Class(class))
        })
        .collect();
    Ok(data)
}

fn score(set_name: &str, chain: &mut Chain, data: &[TrainingRow]) -> Result<(), Box<dyn Error>> {
    let mut num_correct = 0;
    for row in data {
        let output = chain.predict(&row.features)?;
        let class = if output[0] > output[1] { 0 } else { 1 };
        if row.target == Target::Class(class) {
            num_correct += 1;
        }
    }
    info!(set = set_name, correct = num_correct, total = data.len(), "scored");
    Ok(())
}

fn load_params() -> Result<Params, Box<dyn Error>> {
    match env::args().nth(1) {
        Some(path) => Ok(Params::from_json(&fs::read_to_string(path)?)?),
        None => Ok(Params {
            hidden: vec![5, 5],
            activation: Activation::Tanh,
            rate: 0.01,
            momentum_stable: 0.5,
            momentum_ramp: 10_000.0,
            ..Params::default()
        }),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let params = load_params()?;
    params.validate()?;
    let mut model = ModelInfo::new(&params, 2, 2);
    model.randomize_weights(params.seed)?;

    let training_data = generate_data(10_000, 1)?;
    let shard_len = (training_data.len() + WORKERS - 1) / WORKERS;
    for epoch in 0..EPOCHS {
        let reports = thread::scope(|s| {
            let handles: Vec<_> = training_data
                .chunks(shard_len)
                .enumerate()
                .map(|(worker, shard)| {
                    let model = &model;
                    let seed = params.seed ^ (epoch << 32) ^ worker as u64;
                    s.spawn(move || Pass::new(model, InputInfo::numeric(2)).seed(seed).run(shard))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().map_err(|_| "worker panicked"))
                .collect::<Result<Vec<_>, _>>()
        })?;
        let reports = reports.into_iter().collect::<sgd_neurons::Result<Vec<PassReport>>>()?;

        let rows: usize = reports.iter().map(|r| r.rows).sum();
        let loss = reports.iter().map(|r| r.mean_loss * r.rows as f64).sum::<f64>() / rows.max(1) as f64;
        info!(epoch, rows, loss, processed = model.processed(), "epoch complete");
        if model.is_unstable() {
            warn!(epoch, "model diverged, giving up");
            break;
        }
    }

    let mut chain = Chain::classifier(&model, InputInfo::numeric(2), false)?;
    score("training", &mut chain, &training_data)?;
    score("test", &mut chain, &generate_data(1_000, 2)?)?;
    Ok(())
}
