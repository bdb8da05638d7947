//! `kiln build`: one pipeline cycle, then exit.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::bundler::SimpleBundler;
use crate::cache::CacheStore;
use crate::cli::BuildArgs;
use crate::config::ProjectConfig;
use crate::error::BuildFailures;
use crate::pipeline::Coordinator;
use crate::{log, logger};

pub fn run_build(config: Arc<ProjectConfig>, args: &BuildArgs) -> Result<()> {
    logger::set_verbose(args.verbose);

    if args.clean {
        clean_cache(&config);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let cache = Arc::new(CacheStore::open(&config.build.cache_dir));
    let bundler = Arc::new(SimpleBundler::new(config.clone()));
    let coordinator = Coordinator::new(config, bundler, cache);

    let started = Instant::now();
    match rt.block_on(coordinator.build()) {
        Ok(manifest) => {
            log!(
                "build";
                "manifest {} ({} modules) in {:.2?}",
                manifest.version,
                manifest.modules.len() + 1,
                started.elapsed()
            );
            Ok(())
        }
        Err(failures) => {
            report_failures(&failures);
            anyhow::bail!("build failed")
        }
    }
}

pub fn report_failures(failures: &BuildFailures) {
    for (stage, error) in failures {
        log!("error"; "{}: {}", stage, error);
    }
}

pub fn clean_cache(config: &ProjectConfig) {
    if config.build.cache_dir.exists() {
        match std::fs::remove_dir_all(&config.build.cache_dir) {
            Ok(()) => log!("build"; "cleared cache {}", config.build.cache_dir.display()),
            Err(e) => log!("build"; "cannot clear cache: {}", e),
        }
    }
}
