use aggregator::{Aggregator, AggregatorErr, AggregatorHandle};
use futures::future;
use machine_learning::{
    arch::{GradientBatch, Layer, Mlp},
    optimization::GradientDescent,
};
use ndarray::Array2;

const LEARNING_RATE: f64 = 0.3;

fn spawn(model: Mlp) -> AggregatorHandle {
    let (handle, _) = Aggregator::new(model, GradientDescent::new(LEARNING_RATE)).spawn();
    handle
}

fn zero_gradient(sizes: &[usize], batch_size: usize) -> GradientBatch {
    GradientBatch {
        layers: sizes.windows(2).map(|w| Layer::zeros((w[0], w[1]))).collect(),
        batch_size,
    }
}

#[tokio::test]
async fn consecutive_snapshots_are_identical() {
    let handle = spawn(Mlp::random(vec![4, 3, 1], Some(1)).unwrap());

    let first = handle.get_global_weights().await.unwrap();
    let second = handle.get_global_weights().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn zero_gradient_keeps_the_model() {
    let model = Mlp::random(vec![4, 3, 1], Some(2)).unwrap();
    let handle = spawn(model.clone());

    handle
        .apply_gradient(zero_gradient(&[4, 3, 1], 5))
        .await
        .unwrap();

    assert_eq!(handle.get_global_weights().await.unwrap(), model.snapshot());
}

#[tokio::test]
async fn mismatched_gradient_is_rejected_without_changes() {
    let model = Mlp::random(vec![4, 3, 1], Some(3)).unwrap();
    let handle = spawn(model.clone());

    let mut batch = zero_gradient(&[4, 3, 1], 5);
    batch.layers[0].weights.fill(1.0);
    batch.layers[1] = Layer::zeros((2, 1));

    let err = handle.apply_gradient(batch).await.unwrap_err();
    assert!(matches!(err, AggregatorErr::Model(ref e) if e.is_shape_mismatch()));
    assert_eq!(handle.get_global_weights().await.unwrap(), model.snapshot());
}

#[tokio::test]
async fn gradient_step_is_scaled_by_batch_size() {
    let model = Mlp::zeros(vec![1, 1]).unwrap();
    let handle = spawn(model);

    let mut batch = zero_gradient(&[1, 1], 3);
    batch.layers[0].weights.fill(3.0);
    batch.layers[0].biases.fill(-6.0);
    handle.apply_gradient(batch).await.unwrap();

    let snapshot = handle.get_global_weights().await.unwrap();
    assert!((snapshot.layers[0].weights[(0, 0)] + LEARNING_RATE).abs() < 1e-12);
    assert!((snapshot.layers[0].biases[0] - 2.0 * LEARNING_RATE).abs() < 1e-12);
}

#[tokio::test]
async fn stopped_aggregator_hands_back_its_model() {
    let model = Mlp::random(vec![2, 2, 1], Some(4)).unwrap();
    let (handle, task) = Aggregator::new(model.clone(), GradientDescent::new(LEARNING_RATE)).spawn();

    drop(handle);
    assert_eq!(task.await.unwrap(), model);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_workers_apply_in_some_serial_order() {
    let sizes = vec![3, 4, 1];
    let initial = Mlp::random(sizes.clone(), Some(5)).unwrap();
    let handle = spawn(initial.clone());

    let x = Array2::from_shape_fn((6, 3), |(i, j)| (i + j) as f64 / 10.0);
    let y = Array2::from_shape_fn((6, 1), |(i, _)| (i % 2) as f64);

    let workers = (0..2).map(|id| {
        let handle = handle.clone();
        let (x, y) = (x.clone(), y.clone() * (id + 1) as f64);
        let mut local = Mlp::zeros(vec![3, 4, 1]).unwrap();

        async move {
            let snapshot = handle.get_global_weights().await.unwrap();
            local.install(snapshot).unwrap();
            tokio::task::yield_now().await;

            let grad = local.backward(x.view(), y.view()).unwrap();
            handle.apply_gradient(grad.clone()).await.unwrap();
            grad
        }
    });

    let grads = future::join_all(workers.map(tokio::spawn)).await;
    let grads: Vec<GradientBatch> = grads.into_iter().map(Result::unwrap).collect();
    let result = handle.get_global_weights().await.unwrap();

    let serial = |order: [usize; 2]| {
        let mut model = initial.clone();
        let mut optimizer = GradientDescent::new(LEARNING_RATE);
        for i in order {
            model.apply_gradient(&grads[i], &mut optimizer).unwrap();
        }
        model.snapshot()
    };

    assert!(result == serial([0, 1]) || result == serial([1, 0]));
}
