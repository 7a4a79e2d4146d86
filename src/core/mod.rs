pub mod library;
pub mod song;
pub mod status;

pub use library::{Album, Artist, DirEntry, FileEntry, FileList, Output};
pub use song::{file_key, format_time, Song};
pub use status::{PlayerState, Stats, Status};
