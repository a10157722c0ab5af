use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::db::{Asset, Filter, Query, Table};
use crate::error::{not_found, validation, DeskflowResult};
use crate::rate_limit::Access;
use crate::utils::validate_id;

use super::{now_iso, OpMessage};

const LIST_COLUMNS: &str =
    "id, storage_path, original_name, mime_type, width, height, position_x, position_y, created_at";
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
pub struct UploadAsset {
    /// UUID of the note the image belongs to
    pub note_id: String,
    /// File contents, Base64 encoded (a data: URL prefix is accepted)
    pub file_data: String,
    /// Original file name, e.g. "diagram.png"
    pub original_name: String,
    /// MIME type, must be image/*
    pub mime_type: String,
    pub width: f64,
    pub height: f64,
    /// X position inside the note (default 0)
    #[serde(default)]
    pub position_x: Option<f64>,
    /// Y position inside the note (default 0)
    #[serde(default)]
    pub position_y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetUrl {
    pub asset_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedAsset {
    #[serde(flatten)]
    pub asset: Asset,
    pub url: String,
}

fn decode_file_data(data: &str) -> DeskflowResult<Vec<u8>> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|_| validation("file_data is not valid Base64"))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(validation("file cannot exceed 5MB"));
    }
    Ok(bytes)
}

fn extension_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => "png",
    }
}

impl AppState {
    pub async fn list_note_assets(&self, note_id: &str) -> DeskflowResult<Vec<Asset>> {
        self.guard(Access::Read)?;
        validate_id("note_id", note_id)?;
        self.db()
            .fetch_as(&Query::new(Table::Assets, LIST_COLUMNS).eq("note_id", note_id))
            .await
    }

    pub async fn get_asset(&self, asset_id: &str) -> DeskflowResult<Asset> {
        self.guard(Access::Read)?;
        validate_id("asset_id", asset_id)?;
        self.fetch_asset(asset_id, "*").await
    }

    async fn fetch_asset(&self, asset_id: &str, columns: &str) -> DeskflowResult<Asset> {
        self.db()
            .fetch_one(
                &Query::new(Table::Assets, columns).eq("id", asset_id),
                &format!("Asset {} not found", asset_id),
            )
            .await
    }

    pub async fn get_asset_url(&self, asset_id: &str) -> DeskflowResult<AssetUrl> {
        self.guard(Access::Read)?;
        validate_id("asset_id", asset_id)?;
        let asset = self.fetch_asset(asset_id, "id, storage_path").await?;
        let path = asset
            .storage_path
            .ok_or_else(|| not_found(format!("Asset {} has no stored file", asset_id)))?;
        Ok(AssetUrl {
            asset_id: asset_id.to_string(),
            url: self.db().public_url(&path),
        })
    }

    /// Store the image under `<user>/<note>/<uuid>.<ext>` and record it.
    pub async fn upload_asset(&self, input: UploadAsset) -> DeskflowResult<UploadedAsset> {
        self.guard(Access::Write)?;
        validate_id("note_id", &input.note_id)?;
        if input.file_data.is_empty() {
            return Err(validation("file_data is required (Base64)"));
        }
        if input.original_name.trim().is_empty() {
            return Err(validation("original_name is required"));
        }
        if !input.mime_type.starts_with("image/") {
            return Err(validation("mime_type must be an image type"));
        }
        let bytes = decode_file_data(&input.file_data)?;

        let db = self.db();
        let user_id = db.current_user_id().await?;
        let storage_path = format!(
            "{}/{}/{}.{}",
            user_id,
            input.note_id,
            uuid::Uuid::new_v4(),
            extension_of(&input.original_name)
        );
        let size = bytes.len();
        db.upload_object(&storage_path, bytes, &input.mime_type).await?;

        let row = json!({
            "note_id": input.note_id,
            "storage_path": storage_path,
            "original_name": input.original_name,
            "mime_type": input.mime_type,
            "width": input.width,
            "height": input.height,
            "position_x": input.position_x.unwrap_or(0.0),
            "position_y": input.position_y.unwrap_or(0.0),
        });
        let asset: Asset = db.insert_as(Table::Assets, row).await?;
        tracing::info!(asset_id = %asset.id, size, "asset uploaded");
        let url = db.public_url(&storage_path);
        Ok(UploadedAsset { asset, url })
    }

    pub async fn update_asset_position(&self, asset_id: &str, position_x: f64, position_y: f64) -> DeskflowResult<Asset> {
        self.guard(Access::Write)?;
        validate_id("asset_id", asset_id)?;
        let patch = json!({
            "position_x": position_x,
            "position_y": position_y,
            "updated_at": now_iso(),
        });
        let updated: Vec<Asset> = self
            .db()
            .update_as(Table::Assets, &[Filter::eq("id", asset_id)], patch)
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("Asset {} not found", asset_id)))
    }

    /// Removing the stored file is best effort; the record is deleted regardless.
    pub async fn delete_asset(&self, asset_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("asset_id", asset_id)?;
        let asset = self.fetch_asset(asset_id, "id, storage_path").await?;
        let db = self.db();
        if let Some(path) = asset.storage_path {
            if let Err(e) = db.remove_objects(&[path]).await {
                tracing::warn!(asset_id, error = %e, "storage removal failed");
            }
        }
        let rows = db.delete(Table::Assets, &[Filter::eq("id", asset_id)]).await?;
        self.deleted("Asset", asset_id, rows.len())
    }

    pub async fn delete_note_assets(&self, note_id: &str) -> DeskflowResult<OpMessage> {
        self.guard(Access::Write)?;
        validate_id("note_id", note_id)?;
        let db = self.db();
        let assets: Vec<Asset> = db
            .fetch_as(&Query::new(Table::Assets, "id, storage_path").eq("note_id", note_id))
            .await?;
        if assets.is_empty() {
            return Ok(OpMessage::with_count("No assets to delete", 0));
        }

        let paths: Vec<String> = assets.iter().filter_map(|a| a.storage_path.clone()).collect();
        if !paths.is_empty() {
            if let Err(e) = db.remove_objects(&paths).await {
                tracing::warn!(note_id, error = %e, "storage removal failed");
            }
        }
        db.delete(Table::Assets, &[Filter::eq("note_id", note_id)]).await?;
        Ok(OpMessage::with_count(format!("Deleted {} assets", assets.len()), assets.len()))
    }
}
