use resinkit::{console, init_logging, load_config, AppContext, BUILD_DATE, VERSION};
use resinkit_settings::default_config_path;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;
    tracing::info!("resinkit {} (built {})", VERSION, BUILD_DATE);

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    let context = AppContext::new(config);
    context.check_storage();

    let stdin = std::io::stdin();
    let result = console::run(&context, stdin.lock(), std::io::stdout());

    context.shutdown();
    result
}
