//! Parsers turning response bodies into domain types
//!
//! Bodies are the text of a [`Response`](super::Response) without the
//! terminating `OK`. Every parser is lenient: lines it does not understand
//! are skipped rather than failing the whole reply.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::song::parse_seconds;
use crate::core::{Album, Artist, DirEntry, FileEntry, FileList, Output, Song, Stats, Status};

/// Extensions treated as playlists in directory listings
pub const PLAYLIST_SUFFIXES: &[&str] = &["cue", "pls", "asx", "xspf"];

/// Maximum number of songs returned by a tag search
pub const SONG_SEARCH_LIMIT: usize = 100;

/// Split on any line ending, trim, and drop blank lines
pub fn split_lines(data: &str) -> Vec<&str> {
    data.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Split `key: value`; a bare `key:` yields an empty value
pub fn key_value(line: &str) -> Option<(&str, &str)> {
    if let Some((key, value)) = line.split_once(": ") {
        return Some((key, value));
    }
    line.strip_suffix(':').map(|key| (key, ""))
}

/// Split a `command_list_ok_begin` body into per-command line groups
pub fn split_sections(body: &str) -> Vec<Vec<&str>> {
    let mut sections = vec![Vec::new()];
    for line in split_lines(body) {
        if line == "list_OK" {
            sections.push(Vec::new());
        } else if let Some(current) = sections.last_mut() {
            current.push(line);
        }
    }
    if sections.len() > 1 && sections.last().is_some_and(|s| s.is_empty()) {
        sections.pop();
    }
    sections
}

/// Every line of a body, for raw commands
pub fn parse_lines(body: &str) -> Vec<String> {
    split_lines(body).into_iter().map(str::to_string).collect()
}

fn is_key(key: &str, name: &str) -> bool {
    key.eq_ignore_ascii_case(name)
}

fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

struct SongBuilder {
    song: Song,
    has_duration: bool,
}

impl SongBuilder {
    fn new(file: &str) -> Self {
        Self {
            song: Song::new(file),
            has_duration: false,
        }
    }

    fn apply(&mut self, key: &str, value: &str) {
        let song = &mut self.song;
        let text = || Some(value.to_string());
        match key {
            k if is_key(k, "Title") => song.title = text(),
            k if is_key(k, "Artist") => song.artist = text(),
            k if is_key(k, "Album") => song.album = text(),
            k if is_key(k, "AlbumArtist") => song.album_artist = text(),
            k if is_key(k, "Track") => song.track = text(),
            k if is_key(k, "Date") => song.date = text(),
            k if is_key(k, "Genre") => song.genre = text(),
            k if is_key(k, "Name") => song.name = text(),
            k if is_key(k, "Composer") => song.composer = text(),
            k if is_key(k, "Performer") => song.performer = text(),
            k if is_key(k, "Comment") => song.comment = text(),
            k if is_key(k, "duration") => {
                if let Some(seconds) = parse_seconds(value) {
                    song.time = Some(seconds);
                    self.has_duration = true;
                }
            }
            k if is_key(k, "Time") => {
                if !self.has_duration {
                    song.time = parse_seconds(value);
                }
            }
            k if is_key(k, "Id") => song.id = value.trim().parse().ok(),
            k if is_key(k, "Pos") => song.pos = value.trim().parse().ok(),
            _ => {}
        }
    }
}

fn songs_from_lines<'a>(lines: impl IntoIterator<Item = &'a str>, limit: Option<usize>) -> Vec<Song> {
    let mut songs: Vec<SongBuilder> = Vec::new();
    let mut skipping = false;

    for line in lines {
        let Some((key, value)) = key_value(line) else {
            continue;
        };
        if key == "file" {
            if limit.is_some_and(|max| songs.len() >= max) {
                skipping = true;
                continue;
            }
            skipping = false;
            songs.push(SongBuilder::new(value));
        } else if key == "directory" || key == "playlist" {
            // non-song entry; its attributes must not leak into the previous song
            skipping = true;
        } else if !skipping {
            if let Some(current) = songs.last_mut() {
                current.apply(key, value);
            }
        }
    }

    songs.into_iter().map(|b| b.song).collect()
}

/// Songs from `find`, `search`, `playlistinfo`, `listplaylistinfo`, ...
pub fn parse_songs(body: &str) -> Vec<Song> {
    songs_from_lines(split_lines(body), None)
}

/// Songs with an upper bound on the result count
pub fn parse_songs_limited(body: &str, limit: usize) -> Vec<Song> {
    songs_from_lines(split_lines(body), Some(limit))
}

/// File URIs only, in server order
pub fn parse_file_uris(body: &str) -> Vec<String> {
    split_lines(body)
        .into_iter()
        .filter_map(key_value)
        .filter(|(key, _)| *key == "file")
        .map(|(_, value)| value.to_string())
        .collect()
}

/// Order songs by numeric track when both have one, then by file
pub fn sort_songs_by_track(songs: &mut [Song]) {
    songs.sort_by(|a, b| match (a.track_number(), b.track_number()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file.cmp(&b.file)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file.cmp(&b.file),
    });
}

fn apply_status_line(status: &mut Status, key: &str, value: &str) {
    let flag = |v: &str| v.trim() == "1";
    match key {
        "volume" => status.volume = value.trim().parse().ok().filter(|v: &i32| *v >= 0),
        "repeat" => status.repeat = flag(value),
        "random" => status.random = flag(value),
        "single" => status.single = value.trim().to_string(),
        "consume" => status.consume = flag(value),
        "playlist" => status.playlist = value.trim().parse().unwrap_or_default(),
        "playlistlength" => status.playlist_length = value.trim().parse().unwrap_or_default(),
        "state" => status.state = value.trim().parse().unwrap_or_default(),
        "song" => status.song = value.trim().parse().ok(),
        "songid" => status.song_id = value.trim().parse().ok(),
        "nextsong" => status.next_song = value.trim().parse().ok(),
        "nextsongid" => status.next_song_id = value.trim().parse().ok(),
        "elapsed" => status.elapsed = value.trim().parse().ok(),
        "duration" => status.duration = value.trim().parse().ok(),
        "time" => {
            // legacy "elapsed:total"
            if let Some((elapsed, total)) = value.split_once(':') {
                if status.elapsed.is_none() {
                    status.elapsed = elapsed.trim().parse().ok();
                }
                if status.duration.is_none() {
                    status.duration = total.trim().parse().ok();
                }
            }
        }
        "bitrate" => status.bitrate = value.trim().parse().ok(),
        "audio" => status.audio = Some(value.to_string()),
        "xfade" => status.crossfade = value.trim().parse().ok(),
        "updating_db" => status.updating_db = value.trim().parse().ok(),
        "error" => status.error = Some(value.to_string()),
        "replay_gain_mode" => status.replay_gain_mode = Some(value.to_string()),
        other => {
            status.extra.insert(other.to_string(), value.to_string());
        }
    }
}

/// Status from `status`, optionally followed (with `list_OK` separators)
/// by `currentsong` and `replay_gain_status`
pub fn parse_status(body: &str) -> Status {
    let mut status = Status::default();
    for (index, section) in split_sections(body).into_iter().enumerate() {
        if index == 1 {
            status.current_song = songs_from_lines(section, Some(1)).into_iter().next();
            continue;
        }
        for line in section {
            if let Some((key, value)) = key_value(line) {
                apply_status_line(&mut status, key, value);
            }
        }
    }
    status
}

/// The song from `currentsong`, if anything is loaded
pub fn parse_current_song(body: &str) -> Option<Song> {
    parse_songs(body).into_iter().next()
}

pub fn parse_stats(body: &str) -> Stats {
    let mut stats = Stats::default();
    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        let value = value.trim();
        match key {
            "songs" => stats.songs = value.parse().unwrap_or_default(),
            "artists" => stats.artists = value.parse().unwrap_or_default(),
            "albums" => stats.albums = value.parse().unwrap_or_default(),
            "uptime" => stats.uptime = value.parse().unwrap_or_default(),
            "playtime" => stats.playtime = value.parse().unwrap_or_default(),
            "db_playtime" => stats.db_playtime = value.parse().unwrap_or_default(),
            "db_update" => stats.db_update = value.parse().unwrap_or_default(),
            _ => {}
        }
    }
    stats
}

/// Sort key for artist names: a leading "The" is ignored unless followed by another "the"
pub fn artist_sort_key(name: &str) -> &str {
    let mut words = name.splitn(3, ' ');
    let first = words.next().unwrap_or("");
    let second = words.next();
    match second {
        Some(second) if first.eq_ignore_ascii_case("the") && !second.eq_ignore_ascii_case("the") => {
            name[first.len() + 1..].trim_start_matches(' ')
        }
        _ => name,
    }
}

/// Artists from `list artist`, optionally filtered by a case-insensitive prefix
pub fn parse_artists(body: &str, filter: Option<&str>) -> Vec<Artist> {
    let filter = filter.map(str::to_lowercase);
    let mut artists: Vec<Artist> = split_lines(body)
        .into_iter()
        .filter_map(key_value)
        .filter_map(|(_, value)| non_blank(value))
        .filter(|name| match &filter {
            Some(prefix) => name.to_lowercase().starts_with(prefix.as_str()),
            None => true,
        })
        .map(|name| Artist {
            name: name.to_string(),
        })
        .collect();

    artists.sort_by(|a, b| artist_sort_key(&a.name).cmp(artist_sort_key(&b.name)));
    artists
}

/// Albums from `list album group artist|albumartist`
pub fn parse_albums(body: &str, legacy_grouping: bool, sort_by_artist: bool) -> Vec<Album> {
    let mut albums = Vec::new();
    let mut current_artist: Option<String> = None;
    let mut pending: Option<Album> = None;

    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        if is_key(key, "Artist") || is_key(key, "AlbumArtist") {
            let Some(artist) = non_blank(value) else {
                continue;
            };
            if legacy_grouping {
                if let Some(mut album) = pending.take() {
                    album.artist = Some(artist.to_string());
                    albums.push(album);
                }
            } else {
                current_artist = Some(artist.to_string());
            }
        } else if is_key(key, "Album") {
            let name = value.trim();
            if legacy_grouping {
                pending = (!name.is_empty()).then(|| Album::new(name, None));
            } else if !name.is_empty() {
                albums.push(Album::new(name, current_artist.clone()));
            }
        }
    }

    if sort_by_artist {
        albums.sort_by(|a, b| match (&a.artist, &b.artist) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
    } else {
        albums.sort_by(|a, b| a.name.cmp(&b.name));
    }
    albums
}

/// Albums from `list album artist "<artist>" [group date]`
pub fn parse_albums_for_artist(
    body: &str,
    artist: &str,
    legacy_grouping: bool,
    sort_by_date: bool,
) -> Vec<Album> {
    let mut albums = Vec::new();
    let mut current_date: Option<String> = None;
    let mut pending: Option<Album> = None;
    let owned_artist = Some(artist.to_string());

    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        if is_key(key, "Album") {
            if legacy_grouping {
                if let Some(album) = pending.take() {
                    albums.push(album);
                }
                pending = non_blank(value).map(|name| Album::new(name, owned_artist.clone()));
            } else if let Some(name) = non_blank(value) {
                let mut album = Album::new(name, owned_artist.clone());
                album.date = current_date.clone();
                albums.push(album);
            }
        } else if is_key(key, "Date") {
            let Some(date) = non_blank(value) else {
                continue;
            };
            if legacy_grouping {
                if let Some(mut album) = pending.take() {
                    album.date = Some(date.to_string());
                    albums.push(album);
                }
            } else {
                current_date = Some(date.to_string());
            }
        }
    }
    if let Some(album) = pending {
        albums.push(album);
    }

    if sort_by_date {
        albums.sort_by(|a, b| a.sort_year().cmp(&b.sort_year()).then_with(|| a.name.cmp(&b.name)));
    } else {
        albums.sort_by(|a, b| a.name.cmp(&b.name));
    }
    albums
}

pub fn parse_outputs(body: &str) -> Vec<Output> {
    let mut outputs: Vec<Output> = Vec::new();
    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        match key {
            "outputid" => outputs.push(Output {
                id: value.to_string(),
                name: String::new(),
                enabled: false,
            }),
            "outputname" => {
                if let Some(output) = outputs.last_mut() {
                    output.name = value.to_string();
                }
            }
            "outputenabled" => {
                if let Some(output) = outputs.last_mut() {
                    output.enabled = value.trim() == "1";
                }
            }
            _ => {}
        }
    }
    outputs
}

/// Stored playlist names, sorted
pub fn parse_playlists(body: &str) -> Vec<String> {
    let mut names: Vec<String> = split_lines(body)
        .into_iter()
        .filter_map(key_value)
        .filter(|(key, _)| *key == "playlist")
        .map(|(_, value)| value.to_string())
        .collect();
    names.sort();
    names
}

/// Decoder suffixes from `decoders`, each with a leading dot
pub fn parse_decoder_suffixes(body: &str) -> Vec<String> {
    let mut suffixes: Vec<String> = Vec::new();
    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        if key == "suffix" {
            let suffix = format!(".{}", value.trim());
            if !suffixes.contains(&suffix) {
                suffixes.push(suffix);
            }
        }
    }
    suffixes
}

pub fn is_playlist_file(file: &str) -> bool {
    PLAYLIST_SUFFIXES.iter().any(|suffix| file.ends_with(suffix))
}

fn is_playable(file: &str, suffixes: &[String]) -> bool {
    suffixes.is_empty() || !file.contains('.') || suffixes.iter().any(|s| file.ends_with(s.as_str()))
}

/// Directory listing from `lsinfo`
///
/// Files are kept when they have no extension or end with a known decoder
/// suffix. Playlist files are listed as files.
pub fn parse_file_list(body: &str, suffixes: &[String], sort_by_title: bool) -> FileList {
    let mut list = FileList::default();
    let mut current: Option<usize> = None;

    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        match key {
            "file" => {
                current = None;
                if is_playable(value, suffixes) {
                    list.files.push(FileEntry {
                        file: value.to_string(),
                        ..Default::default()
                    });
                    current = Some(list.files.len() - 1);
                }
            }
            "directory" => {
                current = None;
                if !list.dirs.iter().any(|d| d.dir == value) {
                    list.dirs.push(DirEntry {
                        dir: value.to_string(),
                    });
                }
            }
            "playlist" => {
                current = None;
                if is_playlist_file(value) {
                    list.files.push(FileEntry {
                        file: value.to_string(),
                        ..Default::default()
                    });
                }
            }
            k if is_key(k, "Artist") || is_key(k, "Album") || is_key(k, "Title") => {
                if let Some(entry) = current.and_then(|i| list.files.get_mut(i)) {
                    let value = Some(value.to_string());
                    if is_key(k, "Artist") {
                        entry.artist = value;
                    } else if is_key(k, "Album") {
                        entry.album = value;
                    } else {
                        entry.title = value;
                    }
                }
            }
            _ => {}
        }
    }

    if sort_by_title {
        // titled entries first by title, untitled ones after in reverse file order
        list.files.sort_by(|a, b| match (&a.title, &b.title) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.file.cmp(&a.file),
        });
    } else {
        list.files.sort_by(|a, b| a.file.cmp(&b.file));
    }
    list.dirs.sort_by(|a, b| a.dir.cmp(&b.dir));
    list
}

/// Genres mapped to the albums they appear on, from `list genre group album`
pub fn parse_genres(body: &str) -> BTreeMap<String, Vec<String>> {
    let mut genres: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current_album: Option<String> = None;

    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        if is_key(key, "Album") {
            current_album = Some(value.to_string());
        } else if is_key(key, "Genre") && !value.is_empty() {
            let albums = genres.entry(value.to_string()).or_default();
            if let Some(album) = current_album.as_ref().filter(|a| !a.is_empty()) {
                albums.push(album.clone());
            }
        }
    }
    genres
}

/// `songs:` value from `count`
pub fn parse_count(body: &str) -> u32 {
    split_lines(body)
        .into_iter()
        .filter_map(key_value)
        .filter(|(key, _)| *key == "songs")
        .filter_map(|(_, value)| value.trim().parse().ok())
        .last()
        .unwrap_or(0)
}

/// Metadata accompanying one `albumart`/`readpicture` chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryChunk {
    /// Total size of the picture
    pub size: Option<u64>,
    /// Bytes in this chunk
    pub binary: Option<u64>,
}

pub fn parse_binary_chunk(body: &str) -> BinaryChunk {
    let mut chunk = BinaryChunk::default();
    for (key, value) in split_lines(body).into_iter().filter_map(key_value) {
        match key {
            "size" => chunk.size = value.trim().parse().ok(),
            "binary" => chunk.binary = value.trim().parse().ok(),
            _ => {}
        }
    }
    chunk
}

/// Replace anything that is not ASCII alphanumeric with `_`
pub fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
