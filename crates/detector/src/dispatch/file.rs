//! JSON lines 결과 파일 싱크

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use icsguard_core::error::DispatchError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::ScoreResult;

use super::{ResultDocument, ResultSink};

const SINK_NAME: &str = "file";

fn sink_error(reason: impl Into<String>) -> DispatchError {
    DispatchError::Sink {
        sink: SINK_NAME.to_owned(),
        reason: reason.into(),
    }
}

/// 결과를 한 줄에 하나씩 덧붙이는 파일 싱크
///
/// 줄 쓰기는 별도 태스크에서 끝까지 진행됩니다. `publish`가 타임아웃으로 취소되어도
/// 파일에 반쪽 줄이 남지 않습니다.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonLinesSink {
    /// 파일을 추가 모드로 엽니다. 상위 디렉토리가 없으면 생성합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| sink_error(format!("{}: {e}", parent.display())))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| sink_error(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "result file opened");
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonLinesSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn publish<'a>(&'a self, result: &'a ScoreResult) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let mut line = ResultDocument::new(result)
                .to_json()
                .map_err(|e| sink_error(e.to_string()))?;
            line.push('\n');

            let file = Arc::clone(&self.file);
            let write = tokio::spawn(async move {
                let mut file = file.lock_owned().await;
                file.write_all(line.as_bytes()).await?;
                file.flush().await
            });
            write
                .await
                .map_err(|e| sink_error(e.to_string()))?
                .map_err(|e| sink_error(e.to_string()))
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            if let Err(e) = file.sync_all().await {
                warn!(path = %self.path.display(), error = %e, "result file sync failed");
            }
        })
    }
}
