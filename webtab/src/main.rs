//! `webtab`, a terminal server that multiplexes shell tabs over a websocket.
//!

pub mod cli;
use cli::init;
use log::LevelFilter;
use webtab_api::config::load_config;

pub fn main() -> anyhow::Result<()> {
    let args = init();

    if let Some(level) = args.value_of("LOG") {
        let level: LevelFilter = level
            .parse()
            .map_err(|_| anyhow::format_err!("unsupported log level: {}", level))?;
        webtab_api::log::set_level(level);
    }

    let mut config = load_config(cli::config_file(&args))?;
    cli::apply_overrides(&args, &mut config)?;
    config.validate()?;

    webtab_server::server_main(config)
}
