use std::{path::PathBuf, str::FromStr, sync::Arc};

use clap::{CommandFactory, Parser};
use monolayer::{
    cli::{diff_opts, MonolayerArgs, MonolayerSubcommand},
    diff::{Comparer, WalkingDiff},
    utils::default_store_path,
    MonolayerError, MonolayerResult,
};
use monolayer_store::{ContentStore, LocalContentStore};
use oci_spec::image::Digest;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> MonolayerResult<()> {
    // Initialize tracing subscriber with EnvFilter
    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = MonolayerArgs::parse();
    match args.subcommand {
        Some(MonolayerSubcommand::Diff {
            lower,
            upper,
            store,
            media_type,
            compression,
            reference,
            labels,
            mounter,
            mount_root,
        }) => {
            tracing::trace!("diff: lower={lower:?}, upper={upper:?}, store={store:?}");
            let store = open_store(store).await?;
            let differ = WalkingDiff::builder()
                .store(Arc::new(store))
                .mounter(mounter.mounter())
                .mount_root(mount_root)
                .build();

            let token = cancel_on_ctrl_c();
            let opts = diff_opts(compression, media_type, reference, labels);
            let descriptor = differ.compare(&token, &lower, &upper, opts).await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&descriptor).map_err(MonolayerError::custom)?
            );
        }
        Some(MonolayerSubcommand::Info { digest, store }) => {
            let digest = Digest::from_str(&digest).map_err(MonolayerError::custom)?;
            let store = open_store(store).await?;
            let info = store.info(&digest).await.map_err(MonolayerError::custom)?;

            println!(
                "{}",
                serde_json::to_string_pretty(&info).map_err(MonolayerError::custom)?
            );
        }
        None => {
            MonolayerArgs::command().print_help()?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn open_store(path: Option<PathBuf>) -> MonolayerResult<LocalContentStore> {
    let path = path.unwrap_or_else(default_store_path);
    tracing::debug!("using content store at {}", path.display());
    LocalContentStore::new(path)
        .await
        .map_err(MonolayerError::custom)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling diff");
                token.cancel();
            }
        }
    });
    token
}
