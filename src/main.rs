use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use workbench::config::Config;
use workbench::{compress, logging, GalleryManager, ImageFile, SessionManager, Store};

struct Args {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("workbench {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => command.push(other.to_string()),
        }
        i += 1;
    }

    Args { config_path, command }
}

fn print_help() {
    println!(
        r#"workbench - local store for image editing sessions and results

USAGE:
    workbench [OPTIONS] <COMMAND>

COMMANDS:
    gallery list                      List stored results, newest first
    gallery add <FILE>...             Add images to the gallery
    gallery get <ID> <OUT>            Write the full image for ID to OUT
    gallery remove <ID>               Delete one entry
    gallery clear                     Delete every entry
    session show                      Describe the saved editing session
    session save <INDEX> <FILE>...    Save FILEs as the undo/redo stack
    session restore <DIR>             Write the saved session's images into DIR
    session clear                     Delete the saved session
    compress <FILE> <OUT> [--budget BYTES]
                                      Re-encode FILE to fit the byte budget

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    WORKBENCH_CONFIG    Path to config file (overrides default location)
    WORKBENCH_LOG       Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/workbench/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    if args.command.is_empty() {
        print_help();
        std::process::exit(1);
    }

    let store = Arc::new(Store::new(&config.db_path));
    let gallery = GalleryManager::new(Arc::clone(&store), &config.gallery, &config.thumbnails);
    let sessions = SessionManager::new(Arc::clone(&store), &config.session);

    let command: Vec<&str> = args.command.iter().map(String::as_str).collect();
    let result = match command.as_slice() {
        ["gallery", rest @ ..] => run_gallery(&gallery, rest).await,
        ["session", rest @ ..] => run_session(&sessions, rest).await,
        ["compress", input, output, rest @ ..] => run_compress(&config, input, output, rest).await,
        _ => bail!("Unknown command: {}", args.command.join(" ")),
    };

    sessions.flush().await;
    store.close().await;
    result
}

async fn run_gallery(gallery: &GalleryManager, args: &[&str]) -> Result<()> {
    match args {
        ["list"] => {
            let entries = gallery.list().await;
            println!("{} of {} entries", entries.len(), gallery.max_images());
            for entry in entries {
                println!(
                    "{:>6}  {}  {:<40}  {} ({} byte preview)",
                    entry.id,
                    entry.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.name,
                    entry.mime_type,
                    entry.thumbnail.len()
                );
            }
        }
        ["add", files @ ..] if !files.is_empty() => {
            for file in files {
                let image = read_image(Path::new(file)).await?;
                match gallery.try_add(image).await {
                    Ok(id) => println!("{}  {}", id, file),
                    Err(e) => eprintln!("Failed to add {}: {}", file, e),
                }
            }
        }
        ["get", id, out] => {
            let id = parse_id(id)?;
            let image = gallery
                .get(id)
                .await
                .with_context(|| format!("No gallery entry with id {}", id))?;
            tokio::fs::write(out, &image.bytes)
                .await
                .with_context(|| format!("Failed to write {}", out))?;
            println!("{} ({}, {} bytes) -> {}", image.name, image.mime_type, image.len(), out);
        }
        ["remove", id] => gallery.remove(parse_id(id)?).await,
        ["clear"] => gallery.clear().await,
        _ => bail!("Usage: workbench gallery list|add <FILE>...|get <ID> <OUT>|remove <ID>|clear"),
    }
    Ok(())
}

async fn run_session(sessions: &SessionManager, args: &[&str]) -> Result<()> {
    match args {
        ["show"] => match sessions.load().await {
            Some(session) => {
                println!(
                    "Saved {} with {} versions",
                    session.saved_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    session.images.len()
                );
                for (i, image) in session.images.iter().enumerate() {
                    let marker = if i == session.history_index { "*" } else { " " };
                    println!("{} {:>3}  {}  {}  {} bytes", marker, i, image.name, image.mime_type, image.len());
                }
            }
            None => println!("No saved session"),
        },
        ["save", index, files @ ..] => {
            let index: usize = index
                .parse()
                .with_context(|| format!("Invalid history index: {}", index))?;
            let mut images = Vec::with_capacity(files.len());
            for file in files {
                images.push(read_image(Path::new(file)).await?);
            }
            sessions.schedule_save(images, index);
        }
        ["restore", dir] => {
            let Some(session) = sessions.load().await else {
                bail!("No saved session");
            };
            tokio::fs::create_dir_all(dir).await?;
            for (i, image) in session.images.iter().enumerate() {
                let target = Path::new(dir).join(format!("{:03}-{}", i, image.name));
                tokio::fs::write(&target, &image.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                println!("{}", target.display());
            }
        }
        ["clear"] => sessions.clear_session().await,
        _ => bail!("Usage: workbench session show|save <INDEX> <FILE>...|restore <DIR>|clear"),
    }
    Ok(())
}

async fn run_compress(config: &Config, input: &str, output: &str, args: &[&str]) -> Result<()> {
    let mut compression = config.compression.clone();
    match args {
        [] => {}
        ["--budget", bytes] => {
            compression.target_bytes = bytes
                .parse()
                .with_context(|| format!("Invalid byte budget: {}", bytes))?;
        }
        _ => bail!("Usage: workbench compress <FILE> <OUT> [--budget BYTES]"),
    }

    let image = read_image(Path::new(input)).await?;
    let before = image.len();
    let compressed = tokio::task::spawn_blocking(move || compress(image, &compression)).await??;

    tokio::fs::write(output, &compressed.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output))?;
    println!(
        "{} -> {} ({} -> {} bytes, {})",
        input,
        output,
        before,
        compressed.len(),
        compressed.mime_type
    );
    Ok(())
}

async fn read_image(path: &Path) -> Result<ImageFile> {
    ImageFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_id(id: &str) -> Result<i64> {
    id.parse().with_context(|| format!("Invalid gallery id: {}", id))
}
