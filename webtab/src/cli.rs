use clap::App;
use clap::Arg;
use clap::ArgMatches;
use std::net::IpAddr;
use std::path::Path;
use webtab_api::config::ServerConfig;

pub fn init() -> ArgMatches<'static> {
    app().get_matches()
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn app() -> App<'static, 'static> {
    App::new("Terminal Server")
        .version(VERSION)
        .name("webtab")
        .about("`webtab`, a terminal server that hosts shell tabs for websocket clients.")
        .arg(
            Arg::with_name("CONFIG")
                .long("config")
                .short("c")
                .required(false)
                .takes_value(true)
                .value_name("FILE")
                .help("Loads the server config from a yaml file.  Defaults to ~/.webtab/webtab.yml"),
        )
        .arg(
            Arg::with_name("ADDRESS")
                .long("address")
                .short("a")
                .required(false)
                .takes_value(true)
                .validator(|value| {
                    value
                        .parse::<IpAddr>()
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .help("The ip address the server listens on"),
        )
        .arg(
            Arg::with_name("PORT")
                .long("port")
                .short("p")
                .required(false)
                .takes_value(true)
                .validator(|value| value.parse::<u16>().map(|_| ()).map_err(|e| e.to_string()))
                .help("The tcp port the server listens on"),
        )
        .arg(
            Arg::with_name("PATH")
                .long("path")
                .required(false)
                .takes_value(true)
                .help("The request path that accepts websocket connections, e.g. /ws"),
        )
        .arg(
            Arg::with_name("SHELL")
                .long("shell")
                .required(false)
                .takes_value(true)
                .help("The program launched in each new tab.  Defaults to $SHELL"),
        )
        .arg(
            Arg::with_name("LOG")
                .long("log")
                .required(false)
                .takes_value(true)
                .possible_values(&["trace", "debug", "info", "warn", "error", "off"])
                .help("Sets the log level."),
        )
}

pub fn config_file<'a>(args: &'a ArgMatches) -> Option<&'a Path> {
    args.value_of("CONFIG").map(Path::new)
}

/// Applies command-line overrides on top of the file config
pub fn apply_overrides(args: &ArgMatches, config: &mut ServerConfig) -> anyhow::Result<()> {
    if let Some(address) = args.value_of("ADDRESS") {
        config.address = address.parse()?;
    }

    if let Some(port) = args.value_of("PORT") {
        config.port = port.parse()?;
    }

    if let Some(path) = args.value_of("PATH") {
        config.path = path.to_string();
    }

    if let Some(shell) = args.value_of("SHELL") {
        config.shell = shell.to_string();
    }

    Ok(())
}
