use nnkit::keras::{import_sequential_config, KerasImportOptions};
use nnkit::prelude::*;
use nnkit::LossBinaryXent;

const MODEL: &str = r#"{
    "class_name": "Sequential",
    "keras_version": "2.2.4",
    "config": {
        "name": "sequential_1",
        "layers": [
            {"class_name": "Conv2D", "config": {"name": "conv", "filters": 8, "kernel_size": [3, 3],
                "strides": [1, 1], "padding": "same", "activation": "relu",
                "kernel_initializer": {"class_name": "he_normal", "config": {}},
                "kernel_regularizer": {"class_name": "L1L2", "config": {"l1": 0.0, "l2": 0.0005}},
                "batch_input_shape": [null, 28, 28, 1]}},
            {"class_name": "Flatten", "config": {"name": "flat"}},
            {"class_name": "Dense", "config": {"name": "out", "units": 1, "activation": "sigmoid",
                "kernel_initializer": {"class_name": "glorot_uniform", "config": {}}}}
        ]
    }
}"#;

fn main() -> Result<()> {
    env_logger::init();

    let model = import_sequential_config(MODEL, &KerasImportOptions::default())?;
    println!("{}", model.summary());

    let labels = array![[1.0], [0.0], [1.0]];
    let pre_output = array![[2.3], [-0.7], [0.1]];
    let loss = LossBinaryXent::new();
    let (score, grad) = loss.compute_gradient_and_score(&labels, &pre_output, Activation::Sigmoid, None, true)?;
    println!("{}: score {:.5}", loss.name(), score);
    println!("gradient {:?}", grad);
    Ok(())
}
