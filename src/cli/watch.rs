//! `kiln watch`: one build, then watch-driven rebuild cycles until Ctrl+C.

use std::sync::Arc;

use anyhow::Result;

use crate::bundler::SimpleBundler;
use crate::cache::CacheStore;
use crate::cli::BuildArgs;
use crate::cli::build::{clean_cache, report_failures};
use crate::config::ProjectConfig;
use crate::session::{DevSession, WatchHooks};
use crate::watch::ChangeKind;
use crate::{debug, log, logger};

pub fn run_watch(config: Arc<ProjectConfig>, args: &BuildArgs) -> Result<()> {
    logger::set_verbose(args.verbose);

    if args.clean {
        clean_cache(&config);
    }

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        log!("watch"; "shutting down...");
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let cache = Arc::new(CacheStore::open(&config.build.cache_dir));
    let bundler = Arc::new(SimpleBundler::new(config.clone()));

    rt.block_on(async move {
        let mut session = DevSession::new(
            config,
            bundler,
            cache,
            logging_hooks(),
            Some(shutdown_rx),
        )?;
        log!("watch"; "watching for changes (Ctrl+C to stop)");
        session.run().await;
        Ok(())
    })
}

/// Hooks wiring session lifecycle events to the terminal.
fn logging_hooks() -> WatchHooks {
    WatchHooks {
        on_initial_build_complete: Box::new(|elapsed, result| match result {
            Ok(manifest) => {
                log!(
                    "build";
                    "manifest {} ({} modules) in {:.2?}",
                    manifest.version,
                    manifest.modules.len() + 1,
                    elapsed
                );
            }
            Err(failures) => report_failures(failures),
        }),
        on_rebuild_start: Box::new(|decision| {
            log!("watch"; "{} triggered", decision.label());
        }),
        on_rebuild_finish: Box::new(|elapsed, result| match result {
            Ok(manifest) => log!("build"; "manifest {} in {:.2?}", manifest.version, elapsed),
            Err(failures) => report_failures(failures),
        }),
        on_file_event: Box::new(|event| {
            let prefix = match event.kind {
                ChangeKind::Created => "+",
                ChangeKind::Modified => "~",
                ChangeKind::Removed => "-",
            };
            debug!("watch"; "{} {}", prefix, event.path.display());
        }),
        on_watch_error: Box::new(|error| {
            log!("error"; "{}", error);
        }),
    }
}
