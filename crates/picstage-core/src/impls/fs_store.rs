//! LocalFsImageStore - ローカルファイルシステム上の ImageStore
//!
//! # レイアウト
//! - staging:  `<staging>/<user_id>/<file_name>`
//! - location: `<location>/<user_id>/<file_name>`
//!
//! commit は staging から location への rename。
//! cleanup は staging を走査し、mtime を作成時刻として TTL を判定します。
//!
//! # commit と cleanup の競合
//! 両者は `transitions` ロックを共有します。sweep は候補を集めた後、
//! 削除直前にロックの中で mtime を取り直し、まだ staging にあって期限切れのものだけを消します。
//! save の user ディレクトリ作成と sweep の空ディレクトリ削除も同じロックで直列化します。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DEFAULT_MAX_SIZE, read_limited};
use crate::domain::ids::validate_segment;
use crate::domain::{CleanupReport, ImageError, ImageId, StorageError, is_past_ttl};
use crate::ports::{Clock, FileNameGenerator, ImageReader, ImageStore, SystemClock, UlidFileNames};

/// create_new が衝突した場合に名前を振り直す回数
const MAX_NAME_ATTEMPTS: usize = 4;

/// Filesystem-backed store with separate staging and permanent roots.
pub struct LocalFsImageStore {
    location: PathBuf,
    staging: PathBuf,
    max_size: u64,
    clock: Arc<dyn Clock>,
    names: UlidFileNames<Arc<dyn Clock>>,
    transitions: Mutex<()>,
}

impl LocalFsImageStore {
    /// Create both roots if needed.
    ///
    /// # Errors
    /// Returns `Storage` if a root directory cannot be created.
    pub async fn new(
        location: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
    ) -> Result<Self, ImageError> {
        let location = location.into();
        let staging = staging.into();
        fs::create_dir_all(&location).await?;
        fs::create_dir_all(&staging).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            location,
            staging,
            max_size: DEFAULT_MAX_SIZE,
            names: UlidFileNames::new(Arc::clone(&clock)),
            clock,
            transitions: Mutex::new(()),
        })
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// mtime と比較する時刻源を差し替える（テスト用）
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.names = UlidFileNames::new(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    fn staged_path(&self, id: &ImageId) -> PathBuf {
        self.staging.join(id.user_id()).join(id.file_name())
    }

    fn committed_path(&self, id: &ImageId) -> PathBuf {
        self.location.join(id.user_id()).join(id.file_name())
    }

    /// Write `content` to a fresh staged file, retrying the name on collision.
    async fn write_staged(
        &self,
        file_name: &str,
        user_id: &str,
        content: &[u8],
    ) -> Result<ImageId, ImageError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let id = ImageId::new(user_id, self.names.generate(file_name))
                .map_err(StorageError::from)?;
            let Some(mut file) = self.create_staged(&id).await? else {
                continue;
            };
            file.write_all(content).await?;
            file.flush().await?;
            return Ok(id);
        }
        Err(StorageError::Backend(format!(
            "can't allocate a unique file name for user {user_id}"
        ))
        .into())
    }

    /// user ディレクトリの作成と空ファイルの作成を transitions ロックの中で行う。
    /// ファイルができた時点でディレクトリは空でなくなるので、sweep の remove_dir とは競合しない。
    /// 名前が既に使われていれば `None`。
    async fn create_staged(&self, id: &ImageId) -> Result<Option<fs::File>, ImageError> {
        let _guard = self.transitions.lock().await;
        if fs::try_exists(self.committed_path(id)).await? {
            return Ok(None);
        }
        fs::create_dir_all(self.staging.join(id.user_id())).await?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.staged_path(id))
            .await
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Staged files older than `ttl`, plus failures met while listing.
    async fn expired_candidates(
        &self,
        ttl: Duration,
        now: DateTime<Utc>,
        report: &mut CleanupReport,
    ) -> Result<Vec<ImageId>, ImageError> {
        let mut candidates = Vec::new();
        let mut users = match fs::read_dir(&self.staging).await {
            Ok(users) => users,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(candidates),
            Err(e) => return Err(e.into()),
        };

        while let Some(user_dir) = users.next_entry().await? {
            let user_path = user_dir.path();
            if !user_dir.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let mut files = match fs::read_dir(&user_path).await {
                Ok(files) => files,
                Err(e) => {
                    report.record_failure(user_path.display().to_string(), e);
                    continue;
                }
            };
            loop {
                let entry = match files.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        report.record_failure(user_path.display().to_string(), e);
                        break;
                    }
                };
                if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
                    continue;
                }
                let path = entry.path();
                let id = match id_from_path(&path) {
                    Some(id) => id,
                    None => {
                        report.record_failure(path.display().to_string(), "not an image id");
                        continue;
                    }
                };
                match staged_since(&path).await {
                    Ok(Some(created_at)) if is_past_ttl(created_at, now, ttl) => {
                        candidates.push(id)
                    }
                    Ok(_) => {}
                    Err(e) => report.record_failure(id.to_string(), e),
                }
            }
        }
        Ok(candidates)
    }

    /// Delete one candidate if it is still staged and still expired.
    async fn remove_if_expired(
        &self,
        id: &ImageId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> std::io::Result<bool> {
        let _guard = self.transitions.lock().await;
        let path = self.staged_path(id);
        match staged_since(&path).await? {
            Some(created_at) if is_past_ttl(created_at, now, ttl) => {
                fs::remove_file(&path).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// `<root>/<user>/<file>` の末尾 2 要素を ImageId として読む
fn id_from_path(path: &Path) -> Option<ImageId> {
    let file_name = path.file_name()?.to_str()?;
    let user_id = path.parent()?.file_name()?.to_str()?;
    ImageId::new(user_id, file_name).ok()
}

/// mtime of a staged file, `None` when it is gone (committed or removed meanwhile).
async fn staged_since(path: &Path) -> std::io::Result<Option<DateTime<Utc>>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ImageStore for LocalFsImageStore {
    async fn save(
        &self,
        file_name: &str,
        user_id: &str,
        content: ImageReader,
    ) -> Result<ImageId, ImageError> {
        validate_segment("user", user_id).map_err(StorageError::from)?;
        let content = read_limited(content, self.max_size).await?;
        let id = self.write_staged(file_name, user_id, &content).await?;
        debug!(%id, size = content.len(), "staged image");
        Ok(id)
    }

    async fn commit(&self, id: &ImageId) -> Result<(), ImageError> {
        let _guard = self.transitions.lock().await;
        let staged = self.staged_path(id);
        let committed = self.committed_path(id);

        if fs::try_exists(&staged).await? {
            fs::create_dir_all(self.location.join(id.user_id())).await?;
            fs::rename(&staged, &committed).await?;
            debug!(%id, path = %committed.display(), "committed image");
            return Ok(());
        }
        if fs::try_exists(&committed).await? {
            debug!(%id, "image already committed");
            return Ok(());
        }
        Err(ImageError::not_found(id))
    }

    async fn load(&self, id: &ImageId) -> Result<(ImageReader, u64), ImageError> {
        // commit は staging -> location の一方向にしか動かさないので、staging を先に見る。
        // 開いたハンドルは rename 後も読める。
        for path in [self.staged_path(id), self.committed_path(id)] {
            match fs::File::open(&path).await {
                Ok(file) => {
                    let size = file.metadata().await?.len();
                    let reader: ImageReader = Box::new(file);
                    return Ok((reader, size));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ImageError::not_found(id))
    }

    async fn cleanup(&self, ttl: Duration) -> Result<CleanupReport, ImageError> {
        let mut report = CleanupReport::default();
        let now = self.clock.now();
        let candidates = self.expired_candidates(ttl, now, &mut report).await?;

        for id in candidates {
            match self.remove_if_expired(&id, ttl, now).await {
                Ok(true) => {
                    debug!(%id, "removed expired staged image");
                    report.record_removed(id);
                }
                Ok(false) => debug!(%id, "staged image committed during sweep, kept"),
                Err(e) => {
                    warn!(%id, error = %e, "failed to remove staged image");
                    report.record_failure(id.to_string(), e);
                }
            }
        }

        // 空になった user ディレクトリは消せれば消す（中身があれば remove_dir は失敗する）。
        // save の create_staged と同じロックの中で行う。
        let mut users: Vec<&str> = report.removed.iter().map(ImageId::user_id).collect();
        users.dedup();
        let _guard = self.transitions.lock().await;
        for user_id in users {
            let _ = fs::remove_dir(self.staging.join(user_id)).await;
        }
        Ok(report)
    }
}
