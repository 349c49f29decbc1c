#[macro_use]
extern crate log;

use appmeta_tool::{
    asset::{self, AssetError, AssetKind},
    config::Config,
    error::CliError,
    format::{FMT_INT32, FMT_UTF8, FMT_UTF8_SPECIAL},
    ftp::{FtpTransport, RemoteTarget},
    sfo::{self, SfoContainer},
    util, AssetSyncService,
};
use clap::{arg, command, value_parser, ArgMatches, Command};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

fn parse_log_level(level: &str) -> LevelFilter {
    match level {
        "NONE" | "none" => LevelFilter::Off,
        "TRACE" | "trace" => LevelFilter::Trace,
        "DEBUG" | "debug" => LevelFilter::Debug,
        "INFO" | "info" => LevelFilter::Info,
        "WARN" | "warn" => LevelFilter::Warn,
        "ERROR" | "error" => LevelFilter::Error,
        _ => LevelFilter::Warn,
    }
}

fn container_arg() -> clap::Arg {
    arg!(container: <ID>).help("Id of the container, for example CUSA00001.")
}

fn asset_arg() -> clap::Arg {
    arg!(asset: <ASSET>).help(
        "The asset to work with: icon0.png, pic0.png, pic1.png or snd0.at9, or one of the \
            aliases icon, background, cover and sound.",
    )
}

fn cli() -> Command {
    command!()
        .propagate_version(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            arg!(log_level: -l --log_level <LEVEL>)
                .default_value("WARN")
                .help(
                    "Configures the log level for the tool. Available log levels are: NONE \
                    (disables logging entirely), TRACE, DEBUG, INFO, WARN and ERROR.",
                ),
        )
        .arg(
            arg!(config: -c --config <PATH>)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML file describing how to reach the console."),
        )
        .arg(arg!(host: -H --host <HOST>).help("Address of the console."))
        .arg(
            arg!(port: -p --port <PORT>)
                .value_parser(value_parser!(u16))
                .help("Port of the console's FTP server. The default is 2121."),
        )
        .subcommand(Command::new("list").about("Lists the containers on the console."))
        .subcommand(
            Command::new("files")
                .arg(container_arg())
                .about("Lists the image and sound files of a container."),
        )
        .subcommand(
            Command::new("title")
                .arg(container_arg())
                .about("Prints the title of a container."),
        )
        .subcommand(
            Command::new("rename")
                .arg(container_arg())
                .arg(arg!(title: <TITLE>).help("The new title."))
                .about("Renames a container. Titles too long for the metadata are truncated."),
        )
        .subcommand(
            Command::new("pull")
                .arg(arg!(overwrite: -o --overwrite).help(
                    "Overwrite the output file instead of asking when it exists.",
                ))
                .arg(container_arg())
                .arg(asset_arg())
                .arg(
                    arg!(out_file: [OUT_FILE])
                        .value_parser(value_parser!(PathBuf))
                        .help(
                            "Where to save the image. The default is <ID>_<ASSET> in the \
                            current working directory.",
                        ),
                )
                .about("Downloads an image asset of a container as PNG."),
        )
        .subcommand(
            Command::new("push")
                .arg(container_arg())
                .arg(asset_arg())
                .arg(
                    arg!(image: <IMAGE>)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a local image. It is resized to fit the asset."),
                )
                .about("Replaces an image asset of a container."),
        )
        .subcommand(
            Command::new("delete")
                .arg(container_arg())
                .arg(asset_arg())
                .about("Deletes an asset of a container."),
        )
        .subcommand(
            Command::new("sfo-info")
                .arg(
                    arg!(in_file: <PATH>)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a local param.sfo file."),
                )
                .about("Prints the header and the entries of a local param.sfo file."),
        )
        .subcommand(
            Command::new("sfo-rename")
                .arg(
                    arg!(in_file: <PATH>)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a local param.sfo file."),
                )
                .arg(arg!(title: <TITLE>).help("The new title."))
                .arg(
                    arg!(out_file: [OUT_FILE])
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to save the result. The default is to patch the input."),
                )
                .about("Renames the application described by a local param.sfo file."),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config, CliError<'_>> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let text = util::read_file("config file", path)?;
            let text = String::from_utf8_lossy(&text);
            let config = Config::from_toml(&text)
                .map_err(|e| CliError::ConfigParseError(path.as_path(), e))?;
            info!("Loaded config file at {}.", path.display());
            config
        }
        None => Config::default(),
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.host = Some(host.clone());
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    Ok(config)
}

fn target_for<'a>(config: &Config) -> Result<RemoteTarget, CliError<'a>> {
    let host = config.host.as_deref().ok_or(CliError::MissingHost)?;
    Ok(RemoteTarget::with_config(host, config))
}

fn asset_of(matches: &ArgMatches) -> Result<AssetKind, AssetError> {
    matches
        .get_one::<String>("asset")
        .map(String::as_str)
        .unwrap_or_default()
        .parse()
}

fn container_of(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("container")
        .map(String::as_str)
        .unwrap_or_default()
}

fn print_sfo<'a>(path: &'a Path, bytes: &[u8]) -> Result<(), CliError<'a>> {
    let sfo = SfoContainer::parse(bytes).map_err(|e| CliError::SfoError(path, e))?;

    println!("magic: {}", if sfo.has_magic() { "ok" } else { "missing" });
    println!("version: {:#06x}", sfo.version());
    println!("key table: {:#x}", sfo.key_table_offset());
    println!("data table: {:#x}", sfo.data_table_offset());
    println!("entries: {}", sfo.entries().len());

    for entry in sfo.entries() {
        let key = sfo.key(bytes, entry).map_err(|e| CliError::SfoError(path, e))?;
        let value = &bytes[sfo
            .value_range(bytes, entry)
            .map_err(|e| CliError::SfoError(path, e))?];

        let shown = match entry.data_format {
            FMT_UTF8 | FMT_UTF8_SPECIAL => {
                let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
                format!("{:?}", String::from_utf8_lossy(&value[..end]))
            }
            FMT_INT32 if value.len() == 4 => {
                let int = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
                format!("{:#010x}", int)
            }
            _ => hex::encode(value),
        };

        println!(
            "{:<20} fmt {:#06x} len {:>4}/{:<4} {}",
            key, entry.data_format, entry.data_len, entry.data_max_len, shown
        );
    }

    Ok(())
}

fn rename_local<'a>(
    in_file: &'a Path,
    out_file: Option<&'a Path>,
    title: &str,
) -> Result<(), CliError<'a>> {
    let mut bytes = util::read_file("sfo file", in_file)?;
    info!("Loaded file at path {}.", in_file.display());

    let container = SfoContainer::parse(&bytes).map_err(|e| CliError::SfoError(in_file, e))?;
    let report = container
        .write_string(&mut bytes, sfo::is_title_key, title)
        .map_err(|e| CliError::SfoError(in_file, e))?;
    if report.truncated {
        warn!("The title doesn't fit and was truncated.");
    }
    if report.split_char {
        warn!("The truncated title ends in a partial character.");
    }
    info!("Rewrote {} title entries.", report.updated);

    match out_file {
        Some(out_file) => util::save_file("sfo file", out_file, &bytes, false, false)?,
        None => util::save_file("sfo file", in_file, &bytes, true, true)?,
    }

    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), CliError<'_>> {
    match matches.subcommand() {
        Some(("sfo-info", sub_matches)) => {
            let Some(in_file) = sub_matches.get_one::<PathBuf>("in_file") else {
                unreachable!()
            };
            let bytes = util::read_file("sfo file", in_file)?;
            return print_sfo(in_file, &bytes);
        }
        Some(("sfo-rename", sub_matches)) => {
            let Some(in_file) = sub_matches.get_one::<PathBuf>("in_file") else {
                unreachable!()
            };
            let out_file = sub_matches.get_one::<PathBuf>("out_file").map(PathBuf::as_path);
            let title = sub_matches
                .get_one::<String>("title")
                .map(String::as_str)
                .unwrap_or_default();
            return rename_local(in_file, out_file, title);
        }
        _ => {}
    }

    let config = load_config(matches)?;
    let target = target_for(&config)?;
    let service = AssetSyncService::new(FtpTransport);

    match matches.subcommand() {
        Some(("list", _)) => {
            for id in service.try_list_game_containers(&target)? {
                println!("{}", id);
            }
        }
        Some(("files", sub_matches)) => {
            for name in service.try_list_asset_files(&target, container_of(sub_matches))? {
                println!("{}", name);
            }
        }
        Some(("title", sub_matches)) => {
            let id = container_of(sub_matches);
            let title = service.read_title(&target, id);
            println!("{}", title);
            if !title.is_named() {
                return Err(CliError::NoTitle(id.to_owned()));
            }
        }
        Some(("rename", sub_matches)) => {
            let title = sub_matches
                .get_one::<String>("title")
                .map(String::as_str)
                .unwrap_or_default();
            service.try_rename_title(&target, container_of(sub_matches), title)?;
        }
        Some(("pull", sub_matches)) => {
            let id = container_of(sub_matches);
            let kind = asset_of(sub_matches)?;
            if !kind.is_image() {
                return Err(AssetError::NotAnImage(kind).into());
            }

            let image = service.try_fetch_asset(&target, id, kind.file_name())?;
            let bytes = asset::encode_png(&image)?;
            let out_file = sub_matches
                .get_one::<PathBuf>("out_file")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(format!("{}_{}", id, kind.file_name())));
            let overwrite = sub_matches.get_flag("overwrite");

            util::save_file("asset", &out_file, &bytes, overwrite, false)?;
        }
        Some(("push", sub_matches)) => {
            let id = container_of(sub_matches);
            let kind = asset_of(sub_matches)?;
            let Some(image_path) = sub_matches.get_one::<PathBuf>("image") else {
                unreachable!()
            };

            let bytes = util::read_file("image", image_path)?;
            let image = asset::fit_to_role(asset::decode_image(&bytes)?, kind)?;
            service.try_upload_asset(&target, id, kind.file_name(), &image)?;
        }
        Some(("delete", sub_matches)) => {
            let kind = asset_of(sub_matches)?;
            service.try_delete_asset(&target, container_of(sub_matches), kind.file_name())?;
        }
        Some(_) | None => unreachable!(),
    }

    Ok(())
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let log_level = matches
        .get_one::<String>("log_level")
        .map(|level| parse_log_level(level))
        .unwrap_or(LevelFilter::Warn);
    if let Err(e) = SimpleLogger::new().with_level(log_level).init() {
        eprintln!("Couldn't set up logging: {}", e);
    }

    match run(&matches) {
        Ok(()) => {
            info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
