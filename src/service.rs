//! Request pipeline: validate, allocate a workspace, convert, hand back.

use std::time::Duration;

use crate::config::Settings;
use crate::converter::{Converter, OUTPUT_EXTENSION};
use crate::error::{ConvertError, Result};
use crate::metrics::{CONVERSIONS_TOTAL, CONVERSION_LATENCY};
use crate::validation::{Upload, validate_upload};
use crate::workspace::{Workspace, WorkspaceManager, sanitize_filename};

#[derive(Debug, Clone)]
pub struct ConversionService {
    workspaces: WorkspaceManager,
    converter: Converter,
    cleanup_delay: Duration,
    max_upload_bytes: u64,
}

/// A finished conversion whose workspace is still alive.
///
/// The caller must pass it to [`ConversionService::release`] once the file
/// handle has been handed to the transport.
#[derive(Debug)]
pub struct ConvertedDocument {
    pub workspace: Workspace,
    pub file: tokio::fs::File,
    pub size: u64,
    pub download_name: String,
}

impl ConversionService {
    pub fn new(settings: &Settings) -> Self {
        Self {
            workspaces: WorkspaceManager::new(&settings.workspace_root),
            converter: Converter::new(&settings.engine, settings.convert_timeout),
            cleanup_delay: settings.cleanup_delay,
            max_upload_bytes: settings.max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub async fn convert_upload(&self, upload: Upload) -> Result<ConvertedDocument> {
        validate_upload(&upload, self.max_upload_bytes)?;
        CONVERSIONS_TOTAL.inc();

        let workspace = self.workspaces.create().await?;
        tracing::info!(
            workspace = %workspace.token,
            filename = %upload.filename,
            size = upload.data.len(),
            "Conversion accepted"
        );

        match self.convert_in(&workspace, &upload).await {
            Ok(document) => Ok(document),
            Err(e) => {
                if let Err(cleanup) = self.workspaces.destroy(&workspace.path).await {
                    tracing::warn!(workspace = %workspace.token, error = %cleanup, "Failed to remove workspace after error");
                }
                Err(e)
            }
        }
    }

    async fn convert_in(&self, workspace: &Workspace, upload: &Upload) -> Result<ConvertedDocument> {
        let input = self
            .workspaces
            .place_file(workspace, &upload.filename, &upload.data)
            .await?;

        let timer = CONVERSION_LATENCY.start_timer();
        let pdf_path = self.converter.convert(&input, &workspace.path).await?;
        timer.observe_duration();

        let size = tokio::fs::metadata(&pdf_path)
            .await
            .map(|m| m.len())
            .map_err(|_| ConvertError::InvalidOutput(pdf_path.clone()))?;
        if size == 0 {
            return Err(ConvertError::InvalidOutput(pdf_path));
        }

        let file = tokio::fs::File::open(&pdf_path)
            .await
            .map_err(|e| ConvertError::resource(&pdf_path, e))?;

        Ok(ConvertedDocument {
            workspace: workspace.clone(),
            file,
            size,
            download_name: download_name(&upload.filename),
        })
    }

    /// Hand the workspace to deferred cleanup.
    pub fn release(&self, workspace: Workspace) -> tokio::task::JoinHandle<()> {
        self.workspaces
            .schedule_destroy(workspace.path, self.cleanup_delay)
    }
}

/// `<sanitized stem>.pdf` for the Content-Disposition header.
pub fn download_name(original: &str) -> String {
    let safe = sanitize_filename(original);
    let stem = match safe.rfind('.') {
        Some(idx) if idx > 0 => &safe[..idx],
        _ => safe.as_str(),
    };
    format!("{stem}.{OUTPUT_EXTENSION}")
}
