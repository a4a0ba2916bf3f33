//! Content Builder asset extractor.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{ExtractionError, ObjectKind};
use serde_json::{json, Value};

/// Common asset-type ids; the platform vocabulary grows, so unknown ids
/// pass through numerically.
pub const ASSET_TYPES: &[(u64, &str)] = &[
    (5, "HTML Email"),
    (20, "Image"),
    (22, "Document"),
    (23, "Audio"),
    (28, "Video"),
    (195, "Content Block"),
    (196, "Code Snippet"),
    (197, "Text Content"),
    (198, "HTML Content"),
    (199, "Free Form Content"),
    (205, "Webpage"),
    (207, "Template-Based Email"),
    (208, "Text-Only Email"),
    (209, "Email"),
    (210, "Email Template"),
    (211, "Webpage"),
    (212, "Landing Page"),
    (220, "Smart Capture Block"),
    (246, "JSON Message"),
    (247, "CloudPages"),
    (248, "Microsite Collection"),
    (249, "Microsite Page"),
];

pub fn asset_type_name(id: u64) -> Option<&'static str> {
    ASSET_TYPES
        .iter()
        .find(|(type_id, _)| *type_id == id)
        .map(|(_, name)| *name)
}

pub struct AssetExtractor;

#[async_trait::async_trait]
impl super::Extractor for AssetExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Assets
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Asset
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::ContentCategories]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/asset/v1/content/assets")
            .await
    }

    async fn enrich(
        &self,
        ctx: &ExtractorContext,
        items: Vec<Value>,
        errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        let mut enriched = Vec::with_capacity(items.len());
        for mut item in items {
            // The category reference is nested; hoist the id so the
            // breadcrumb helper can see it.
            let category_id = item
                .get("category")
                .and_then(|c| raw_str(c, "id"));
            if let (Some(category_id), Some(map)) = (category_id, item.as_object_mut()) {
                map.insert("categoryId".to_string(), Value::String(category_id));
            }
            ctx.attach_breadcrumb(
                self.kind(),
                CacheKind::ContentCategories,
                &mut item,
                "categoryId",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap {
            customer_key: "customerKey",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Asset, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");
            record.status = item
                .get("status")
                .and_then(|s| raw_str(s, "name"))
                .or(record.status);

            let asset_type = item.get("assetType");
            let type_id = asset_type.and_then(|t| t.get("id")).and_then(|v| v.as_u64());
            let type_name = type_id
                .and_then(asset_type_name)
                .map(str::to_string)
                .or_else(|| asset_type.and_then(|t| raw_str(t, "displayName")))
                .or_else(|| asset_type.and_then(|t| raw_str(t, "name")));

            record = record
                .with_attribute("assetTypeId", json!(type_id))
                .with_attribute(
                    "assetTypeName",
                    type_name.map(Value::String).unwrap_or(Value::Null),
                )
                .with_attribute(
                    "contentType",
                    item.get("contentType").cloned().unwrap_or(Value::Null),
                );
            if ctx.options.include_content {
                record = record
                    .with_attribute("content", item.get("content").cloned().unwrap_or(Value::Null));
            }

            out.records.push(record);
        }
    }
}
