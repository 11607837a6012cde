use clap::Parser;

fn main() -> Result<(), anyhow::Error> {
    let cli = batchctl::Cli::parse();
    cli_common::init_logging(&cli.log_args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .expect("failed to start runtime");

    let handle = runtime.spawn(async move { cli.run().await });
    let result = runtime.block_on(handle);

    // We must call `shutdown_background()` because otherwise an incomplete spawned future
    // could block indefinitely.
    runtime.shutdown_background();

    result?
}
