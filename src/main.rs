mod cli;

use anyhow::Context;
use cookie_baker::Worker;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::parse();
    let config = match cli.worker_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Cannot start worker: {}", err.describe());
            return err.exit_code();
        }
    };

    match run(Worker::new(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(mut worker: Worker) -> anyhow::Result<()> {
    let input_port = worker.config().input_port;
    worker.set_finished_callback(|bake| {
        log::info!(
            "Bake {} ready: {}x{} pixels, mean intensity {:.4}",
            bake.workload_id,
            bake.image.resolution(),
            bake.image.resolution(),
            bake.image.mean_intensity()
        );
    });
    worker
        .run()
        .with_context(|| format!("worker on input port {} failed", input_port))
}
