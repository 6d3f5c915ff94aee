mod download;
mod episode_cache;
mod filename;
mod store;

pub use download::{DownloadedAudio, download_audio};
pub use episode_cache::{CacheOutcome, EpisodeCache, Playable};
pub use filename::{audio_extension, cache_file_name, key_digest};
pub use store::{CACHE_NAMESPACE, CacheStore, CachedObject, DiskCacheStore, MemoryCacheStore};
