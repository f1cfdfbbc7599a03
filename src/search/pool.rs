use crate::config::Settings;
use crate::error::{Result, VfsError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::debug;

/// Independently sized worker pools, one per activity
#[derive(Clone)]
pub struct WorkerPools {
    search: Arc<ThreadPool>,
    sort: Arc<ThreadPool>,
    thumbnail: Arc<ThreadPool>,
}

impl WorkerPools {
    /// Size the pools from settings, deriving zeros from the processor count
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_threads(
            settings.effective_search_threads(),
            settings.effective_sort_threads(),
            settings.effective_thumbnail_threads(),
        )
    }

    pub fn with_threads(search: usize, sort: usize, thumbnail: usize) -> Result<Self> {
        debug!(search, sort, thumbnail, "building worker pools");
        Ok(Self {
            search: Arc::new(build_pool("search", search)?),
            sort: Arc::new(build_pool("sort", sort)?),
            thumbnail: Arc::new(build_pool("thumbnail", thumbnail)?),
        })
    }

    pub fn search(&self) -> &Arc<ThreadPool> {
        &self.search
    }

    pub fn sort(&self) -> &Arc<ThreadPool> {
        &self.sort
    }

    pub fn thumbnail(&self) -> &Arc<ThreadPool> {
        &self.thumbnail
    }
}

fn build_pool(activity: &'static str, threads: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("packscope-{activity}-{i}"))
        .build()
        .map_err(|e| VfsError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_are_sized_independently() {
        let pools = WorkerPools::with_threads(3, 2, 1).unwrap();
        assert_eq!(pools.search().current_num_threads(), 3);
        assert_eq!(pools.sort().current_num_threads(), 2);
        assert_eq!(pools.thumbnail().current_num_threads(), 1);
    }

    #[test]
    fn test_zero_threads_still_builds() {
        let pools = WorkerPools::with_threads(0, 0, 0).unwrap();
        assert_eq!(pools.search().current_num_threads(), 1);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            search_threads: 2,
            ..Settings::default()
        };
        let pools = WorkerPools::from_settings(&settings).unwrap();
        assert_eq!(pools.search().current_num_threads(), 2);
    }
}
