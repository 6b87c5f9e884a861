use std::env;
use std::process::ExitCode;

use log::{error, info};

use shrew_transform::{adam, fit, Checkpoint, Error, LinearRegression, Result, TransformConfig};

const DEFAULT_SEED: u64 = 42;
const DEFAULT_STEPS: u64 = 1000;
const TARGET: f64 = 0.5;

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("{name}={v}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn run() -> Result<()> {
    let seed = env_u64("SEED", DEFAULT_SEED)?;
    let steps = env_u64("STEPS", DEFAULT_STEPS)?;

    // usage: fit_linear [optimizer.json] [checkpoint.json]
    let mut args = env::args().skip(1);
    let optimizer = match args.next() {
        Some(path) => {
            info!("loading optimizer config from {path}");
            TransformConfig::from_file(&path)?.build()?
        }
        None => adam(0.1),
    };
    let checkpoint_path = args.next();

    let problem = LinearRegression::synthetic(seed, 16, 2, TARGET)?;
    let params = problem.init_params();
    info!("initial loss {:.6e}", problem.loss(&params)?);

    let outcome = fit(&*optimizer, params, steps, |p| problem.grad(p))?;

    info!("final loss {:.6e}", problem.loss(&outcome.params)?);
    for (name, leaf) in outcome.params.iter() {
        println!("{name} = {leaf}");
    }

    if let Some(path) = checkpoint_path {
        Checkpoint::new(outcome.steps, outcome.params, outcome.state).save(path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
