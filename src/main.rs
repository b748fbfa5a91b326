use notamwatch::{Config, run};

fn main() -> anyhow::Result<()> {
    // A broken config is reported by `run`, after the CLI has been parsed.
    let worker_threads = Config::load().map_or(0, |c| c.general.worker_threads);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("notamwatch-worker");

    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }

    builder.build()?.block_on(run())
}
