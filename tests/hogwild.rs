//! Several workers training one shared model at the same time.

use sgd_neurons::data::{InputInfo, Target, TrainingRow};
use sgd_neurons::params::{Activation, Params};
use sgd_neurons::{ModelInfo, Pass, PassReport};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;

const WORKERS: usize = 4;

fn rows(n: usize, seed: u64) -> Vec<TrainingRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let x: f64 = rng.gen_range(-1.0..1.0);
            let y: f64 = rng.gen_range(-1.0..1.0);
            let class = if x + y > 0.0 { 0 } else { 1 };
            TrainingRow::new(vec![x, y], Target::Class(class))
        })
        .collect()
}

fn params() -> Params {
    Params {
        hidden: vec![8],
        activation: Activation::Rectifier,
        rate: 0.05,
        momentum_start: 0.5,
        momentum_stable: 0.9,
        momentum_ramp: 2_000.0,
        ..Params::default()
    }
}

fn parallel_pass(model: &ModelInfo, data: &[TrainingRow], epoch: u64) -> Vec<PassReport> {
    thread::scope(|s| {
        let handles: Vec<_> = data
            .chunks(data.len() / WORKERS)
            .enumerate()
            .map(|(worker, shard)| {
                let seed = (epoch << 8) + worker as u64;
                s.spawn(move || Pass::new(model, InputInfo::numeric(2)).seed(seed).run(shard).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn concurrent_workers_share_one_model() {
    let mut model = ModelInfo::new(&params(), 2, 2);
    model.randomize_weights(17).unwrap();
    let data = rows(2_000, 1);
    let info = InputInfo::numeric(2);

    let before = Pass::new(&model, info.clone()).training(false).run(&data).unwrap();
    for epoch in 0..5 {
        let reports = parallel_pass(&model, &data, epoch);
        assert_eq!(reports.len(), WORKERS);
        assert!(reports.iter().all(|r| r.rows == data.len() / WORKERS && !r.unstable));
    }

    // The counter is atomic even though the weights are not.
    assert_eq!(model.processed(), 5 * data.len() as u64);
    assert!(!model.is_unstable());
    for i in 0..model.connections() {
        let w = model.weights(i).as_dense_row().unwrap().to_vec();
        assert!(w.iter().all(|v| v.is_finite()));
        assert!(model.biases(i).to_vec().iter().all(|v| v.is_finite()));
    }

    let after = Pass::new(&model, info).training(false).run(&data).unwrap();
    assert!(
        after.mean_loss < before.mean_loss,
        "loss went from {} to {}",
        before.mean_loss,
        after.mean_loss
    );
}

#[test]
fn instability_is_visible_to_every_worker() {
    let model = ModelInfo::new(&params(), 2, 2);
    let data = rows(400, 2);
    model.set_unstable();
    let reports = parallel_pass(&model, &data, 0);
    assert!(reports.iter().all(|r| r.rows == 0 && r.unstable));
    assert_eq!(model.processed(), 0);
}
