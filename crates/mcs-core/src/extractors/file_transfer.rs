//! File transfer activity extractor. A target of automation edges only.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{ExtractionError, ObjectKind};
use serde_json::Value;

pub struct FileTransferExtractor;

#[async_trait::async_trait]
impl super::Extractor for FileTransferExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::FileTransfers
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::FileTransfer
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::FileTransferFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/filetransfers")
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
            ctx.attach_breadcrumb(
                self.kind(),
                CacheKind::FileTransferFolders,
                &mut item,
                "categoryId",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap {
            id: "fileTransferDefinitionId",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::FileTransfer, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");

            let location = item.get("fileTransferLocation");
            record = record
                .with_attribute(
                    "fileTransferLocationName",
                    location.and_then(|l| l.get("name")).cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "fileNamingPattern",
                    item.get("fileNamingPattern").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "fileAction",
                    item.get("fileAction").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "isCompressed",
                    item.get("isCompressed").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "isEncrypted",
                    item.get("isEncrypted").cloned().unwrap_or(Value::Null),
                );

            out.records.push(record);
        }
    }
}
