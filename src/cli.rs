use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use mpd_remote::core::{format_time, Song, Status};
use mpd_remote::storage::{AutoplayStore, ConnectionStore, SavedServer};
use mpd_remote::{ClientEvent, ClientOptions, MpdClient, Settings, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "mpd-remote", version, about = "Remote control for a Music Player Daemon")]
pub struct CliArgs {
    /// Server host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Server password
    #[arg(long)]
    pub password: Option<String>,

    /// Use a saved server by name
    #[arg(short, long)]
    pub server: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Show the player status
    Status,
    /// Start playback, optionally at a queue song id
    Play { id: Option<u32> },
    Pause,
    Stop,
    Next,
    Previous,
    /// Set the volume (0-100)
    Volume { level: u8 },
    /// Seek within the current song
    Seek { seconds: f64 },
    /// Search the library
    Search {
        query: String,
        /// Search only this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// List artists, optionally by name prefix
    Artists { filter: Option<String> },
    /// List albums, or the albums of one artist
    Albums { artist: Option<String> },
    /// Append a song, or play it now and restore the queue afterwards
    Add {
        uri: String,
        #[arg(long)]
        now: bool,
    },
    /// Show the queue
    Queue,
    /// List stored playlists
    Playlists,
    /// Load a stored playlist
    Load {
        name: String,
        /// Replace the queue and start playing
        #[arg(long)]
        now: bool,
    },
    /// List audio outputs
    Outputs,
    Enable { id: String },
    Disable { id: String },
    /// Append random songs
    Random {
        size: usize,
        /// Tag to filter on (defaults to the configured one)
        #[arg(long)]
        tag: Option<String>,
        /// `+`-separated tag values, e.g. `Jazz+Soul`
        #[arg(long)]
        values: Option<String>,
    },
    /// Send a raw protocol command
    Raw { command: String },
    /// Print status changes until interrupted
    Watch,
    /// Manage saved servers
    Servers {
        #[command(subcommand)]
        action: ServerAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServerAction {
    List,
    Add {
        name: String,
        host: String,
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long)]
        password: Option<String>,
    },
    Remove { name: String },
}

pub async fn run(args: CliArgs, settings: Settings) -> Result<()> {
    let store = ConnectionStore::default_location();
    if let CliCommand::Servers { action } = &args.command {
        return run_servers(&store, action);
    }

    let options = resolve_options(&args, &settings, &store)?;
    let client = MpdClient::connect(options.clone())
        .await
        .with_context(|| format!("Failed to connect to {}:{}", options.host, options.port))?;

    let result = run_command(&client, &args.command, &settings).await;
    client.disconnect().await;
    result
}

/// Saved server (by flag or auto-connect), then flags on top
fn resolve_options(
    args: &CliArgs,
    settings: &Settings,
    store: &ConnectionStore,
) -> Result<ClientOptions> {
    let server_name = args.server.clone().or_else(|| {
        settings
            .auto_connect
            .then(|| settings.auto_connect_server.clone())
            .flatten()
    });

    let saved = match &server_name {
        Some(name) => Some(
            store
                .find(name)?
                .with_context(|| format!("No saved server named {}", name))?,
        ),
        None => None,
    };

    let host = args
        .host
        .clone()
        .or_else(|| saved.as_ref().map(|s| s.host.clone()))
        .unwrap_or_else(|| "localhost".to_string());
    let port = args
        .port
        .or_else(|| saved.as_ref().map(|s| s.port))
        .unwrap_or(DEFAULT_PORT);
    let password = args
        .password
        .clone()
        .or_else(|| saved.and_then(|s| s.password));

    debug!("Using {}:{}", host, port);
    Ok(ClientOptions::from_settings(settings, host, port)
        .with_password(password)
        .with_autoplay_store(AutoplayStore::default_location()))
}

fn run_servers(store: &ConnectionStore, action: &ServerAction) -> Result<()> {
    match action {
        ServerAction::List => {
            let servers = store.list()?;
            if servers.is_empty() {
                println!("No saved servers");
            }
            for server in servers {
                println!("{}\t{}:{}", server.name, server.host, server.port);
            }
        }
        ServerAction::Add {
            name,
            host,
            port,
            password,
        } => {
            let mut server = SavedServer::new(name, host, *port);
            server.password = password.clone();
            if !store.add(server)? {
                bail!("A server named {} or at {}:{} already exists", name, host, port);
            }
            info!("Saved {}", name);
        }
        ServerAction::Remove { name } => {
            let server = store
                .find(name)?
                .with_context(|| format!("No saved server named {}", name))?;
            store.remove(&server)?;
            info!("Removed {}", name);
        }
    }
    Ok(())
}

async fn run_command(client: &MpdClient, command: &CliCommand, settings: &Settings) -> Result<()> {
    match command {
        CliCommand::Status => {
            print_status(&client.status().await?);
            if let Some(traffic) = client.traffic().await {
                println!(
                    "traffic: {} bytes in, {} bytes out, {} replies, {} errors",
                    traffic.bytes_received, traffic.bytes_sent, traffic.frames, traffic.errors
                );
            }
        }
        CliCommand::Play { id } => client.play(*id).await?,
        CliCommand::Pause => client.pause().await?,
        CliCommand::Stop => client.stop().await?,
        CliCommand::Next => client.next().await?,
        CliCommand::Previous => client.previous().await?,
        CliCommand::Volume { level } => client.set_volume(*level).await?,
        CliCommand::Seek { seconds } => client.seek_current(*seconds).await?,
        CliCommand::Search { query, tag } => {
            let songs = match tag {
                Some(tag) => client.songs(query, Some(tag.as_str())).await?,
                None => client.search(query, Some((0, settings.max_list_size as u32))).await?,
            };
            songs.iter().for_each(print_song);
        }
        CliCommand::Artists { filter } => {
            for artist in client.artists(filter.as_deref()).await? {
                println!("{}", artist.name);
            }
        }
        CliCommand::Albums { artist } => {
            let albums = match artist {
                Some(artist) => {
                    client
                        .albums_for_artist(artist, settings.sort_albums_by_date)
                        .await?
                }
                None => client.albums(true, false).await?,
            };
            for album in albums {
                match (&album.artist, &album.date) {
                    (_, Some(date)) => println!("{} ({})", album.name, date),
                    (Some(artist), None) => println!("{} - {}", artist, album.name),
                    (None, None) => println!("{}", album.name),
                }
            }
        }
        CliCommand::Add { uri, now } => client.add_song(uri, *now).await?,
        CliCommand::Queue => {
            let songs = client.queue().await?;
            songs
                .iter()
                .take(settings.max_list_size)
                .for_each(print_song);
        }
        CliCommand::Playlists => {
            for name in client.list_playlists().await? {
                println!("{}", name);
            }
        }
        CliCommand::Load { name, now } => client.load_playlist(name, *now).await?,
        CliCommand::Outputs => {
            for output in client.outputs().await? {
                let mark = if output.enabled { "*" } else { " " };
                println!("{} {}\t{}", mark, output.id, output.name);
            }
        }
        CliCommand::Enable { id } => client.enable_output(id).await?,
        CliCommand::Disable { id } => client.disable_output(id).await?,
        CliCommand::Random { size, tag, values } => {
            let tag = tag.clone().or_else(|| settings.random_playlist_by_type.clone());
            let filter = match (&tag, values) {
                (Some(tag), Some(values)) => Some((tag.as_str(), values.as_str())),
                (None, Some(_)) => bail!("--values needs a tag (--tag or random_playlist_by_type)"),
                _ => None,
            };
            let added = client.random_playlist(*size, filter).await?;
            println!("Added {} songs", added);
        }
        CliCommand::Raw { command } => {
            for line in client.run_command(command).await? {
                println!("{}", line);
            }
        }
        CliCommand::Watch => watch(client).await?,
        CliCommand::Servers { .. } => unreachable!("handled before connecting"),
    }
    Ok(())
}

async fn watch(client: &MpdClient) -> Result<()> {
    let mut events = client.subscribe();
    print_status(&client.status().await?);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::Status(status)) => {
                    if status.reload_queue {
                        println!("Queue restored");
                    }
                    print_status(&status);
                }
                Ok(ClientEvent::Disconnected) => println!("Disconnected, retrying"),
                Ok(ClientEvent::InternalConnected) => println!("Reconnected"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_song(song: &Song) {
    let time = song.display_time().unwrap_or_default();
    match (&song.artist, song.id) {
        (Some(artist), Some(id)) => println!("{:>5} {} - {} {}", id, artist, song.display_title(), time),
        (Some(artist), None) => println!("{} - {} {}", artist, song.display_title(), time),
        (None, Some(id)) => println!("{:>5} {} {}", id, song.display_title(), time),
        (None, None) => println!("{} {}", song.display_title(), time),
    }
}

fn print_status(status: &Status) {
    if let Some(song) = &status.current_song {
        let artist = song.artist.as_deref().unwrap_or("Unknown artist");
        println!("{} - {}", artist, song.display_title());
    }
    let elapsed = status.elapsed.map(|e| format_time(e.max(0.0) as u32));
    let total = status.total_time().map(format_time);
    let position = match (elapsed, total) {
        (Some(e), Some(t)) => format!("  {}/{}", e, t),
        (Some(e), None) => format!("  {}", e),
        _ => String::new(),
    };
    let on = |flag: bool| if flag { "on" } else { "off" };
    let volume = status
        .volume
        .map(|v| format!("{}%", v))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "[{}] #{}/{}{}",
        status.state,
        status.song.map(|s| s + 1).unwrap_or(0),
        status.playlist_length,
        position
    );
    println!(
        "volume: {}  repeat: {}  random: {}  single: {}  consume: {}",
        volume,
        on(status.repeat),
        on(status.random),
        if status.single.is_empty() { "0" } else { status.single.as_str() },
        on(status.consume)
    );
    if let Some(error) = &status.error {
        println!("error: {}", error);
    }
}
