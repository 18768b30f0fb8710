use {
    tracing::info,
    inference_server::{
        server::run_server,
        utils::{init_logging, load_config},
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(config.get_bool("logging.json").unwrap_or(false));

    run_server(&config).await?;

    info!("done");
    Ok(())
}
