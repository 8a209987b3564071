use docker_image_getter::cli::{Args, Runner};
use docker_image_getter::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args().with_env_overrides();
    logging::init(args.debug);

    let runner = Runner::new(args);
    match runner.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            runner.report(&e);
            ExitCode::FAILURE
        }
    }
}
