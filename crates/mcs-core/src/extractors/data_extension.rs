//! Data extension extractor (SOAP).
//!
//! Data extensions are the reference target of most edges in the graph;
//! the extractor itself emits none. Field lists are fetched per DE with
//! bounded parallelism when details are enabled.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{ExtractionError, ObjectKind};
use futures::stream::{self, StreamExt};
use mcs_connectors::SimpleFilter;
use serde_json::{json, Value};

const DE_PROPERTIES: &[&str] = &[
    "ObjectID",
    "CustomerKey",
    "Name",
    "Description",
    "CategoryID",
    "IsSendable",
    "IsTestable",
    "CreatedDate",
    "ModifiedDate",
];

const FIELD_PROPERTIES: &[&str] = &[
    "Name",
    "FieldType",
    "MaxLength",
    "IsPrimaryKey",
    "IsRequired",
    "Ordinal",
    "Scale",
];

pub struct DataExtensionExtractor;

impl DataExtensionExtractor {
    async fn enrich_one(ctx: ExtractorContext, mut item: Value) -> (Value, Vec<ExtractionError>) {
        let kind = ExtractorKind::DataExtensions;
        let mut errors = Vec::new();

        ctx.attach_breadcrumb(
            kind,
            CacheKind::DataExtensionFolders,
            &mut item,
            "CategoryID",
            &mut errors,
        )
        .await;

        if ctx.options.include_details {
            if let Some(customer_key) = raw_str(&item, "CustomerKey") {
                let filter = SimpleFilter::equals("DataExtension.CustomerKey", &customer_key);
                let outcome = ctx
                    .paced_retrieve_all(kind, "DataExtensionField", FIELD_PROPERTIES, Some(&filter))
                    .await;
                if let Some(error) = outcome.error {
                    errors.push(error);
                } else {
                    let fields: Vec<Value> = outcome
                        .items
                        .iter()
                        .map(|field| {
                            json!({
                                "name": raw_str(field, "Name"),
                                "fieldType": raw_str(field, "FieldType"),
                                "maxLength": raw_str(field, "MaxLength"),
                                "isPrimaryKey": soap_bool(field, "IsPrimaryKey"),
                                "isRequired": soap_bool(field, "IsRequired"),
                                "ordinal": raw_str(field, "Ordinal"),
                                "scale": raw_str(field, "Scale"),
                            })
                        })
                        .collect();
                    if let Some(map) = item.as_object_mut() {
                        map.insert("fields".to_string(), Value::Array(fields));
                    }
                }
            }
        }

        (item, errors)
    }
}

/// SOAP booleans arrive as the strings "true"/"false".
fn soap_bool(item: &Value, field: &str) -> bool {
    matches!(item.get(field).and_then(|v| v.as_str()), Some("true"))
        || item.get(field).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[async_trait::async_trait]
impl super::Extractor for DataExtensionExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::DataExtensions
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::DataExtension
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::DataExtensionFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(self.kind(), "DataExtension", DE_PROPERTIES, None)
            .await
    }

    async fn enrich(
        &self,
        ctx: &ExtractorContext,
        items: Vec<Value>,
        errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        let concurrency = ctx.options.max_detail_concurrency.max(1);
        let results: Vec<(Value, Vec<ExtractionError>)> = stream::iter(items)
            .map(|item| Self::enrich_one(ctx.clone(), item))
            .buffered(concurrency)
            .collect()
            .await;

        let mut enriched = Vec::with_capacity(results.len());
        for (item, mut item_errors) in results {
            errors.append(&mut item_errors);
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "ObjectID").or_else(|| raw_str(item, "CustomerKey"))
            else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::DataExtension,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.folder_id = raw_str(item, "CategoryID");
            record.folder_path = raw_str(item, "folderPath");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");

            let fields = item.get("fields").and_then(|v| v.as_array());
            let primary_keys: Vec<Value> = fields
                .map(|fields| {
                    fields
                        .iter()
                        .filter(|f| f.get("isPrimaryKey").and_then(|v| v.as_bool()) == Some(true))
                        .filter_map(|f| f.get("name").cloned())
                        .collect()
                })
                .unwrap_or_default();

            record = record
                .with_attribute("isSendable", json!(soap_bool(item, "IsSendable")))
                .with_attribute("isTestable", json!(soap_bool(item, "IsTestable")))
                .with_attribute(
                    "fieldCount",
                    json!(fields.map_or(0, |f| f.len())),
                )
                .with_attribute("fields", item.get("fields").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "primaryKeyFields",
                    if primary_keys.is_empty() {
                        Value::Null
                    } else {
                        Value::Array(primary_keys)
                    },
                );

            out.records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::engine_fixture;
    use crate::extractors::run_extractor;
    use crate::models::ExtractorStatus;
    use mcs_connectors::testing::MockResponse;

    #[tokio::test]
    async fn pipeline_attaches_fields_and_emits_no_edges() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/email/v1/category")
            .always(MockResponse::json(200, serde_json::json!({"items": []})));
        let soap = fixture.backend.on("/Service.asmx");
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r1",
                "<Results><ObjectID>de-1</ObjectID><CustomerKey>customers</CustomerKey>\
                 <Name>Customers</Name><IsSendable>true</IsSendable>\
                 <CategoryID>3</CategoryID></Results>",
            ),
        ));
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r2",
                "<Results><Name>Email</Name><FieldType>EmailAddress</FieldType>\
                 <IsPrimaryKey>true</IsPrimaryKey><IsRequired>true</IsRequired>\
                 <Ordinal>0</Ordinal></Results>\
                 <Results><Name>FirstName</Name><FieldType>Text</FieldType>\
                 <IsPrimaryKey>false</IsPrimaryKey><MaxLength>50</MaxLength>\
                 <Ordinal>1</Ordinal></Results>",
            ),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&DataExtensionExtractor, &ctx).await;

        assert_eq!(result.status, ExtractorStatus::Ok);
        assert!(result.edges.is_empty());
        assert_eq!(result.items.len(), 1);

        let record = &result.items[0];
        assert_eq!(record.customer_key.as_deref(), Some("customers"));
        assert_eq!(record.attributes["fieldCount"], serde_json::json!(2));
        assert_eq!(
            record.attributes["primaryKeyFields"],
            serde_json::json!(["Email"])
        );
        assert_eq!(record.attributes["isSendable"], serde_json::json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn field_fetch_failure_keeps_the_de_as_partial() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/email/v1/category")
            .always(MockResponse::json(200, serde_json::json!({"items": []})));
        let soap = fixture.backend.on("/Service.asmx");
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r1",
                "<Results><ObjectID>de-2</ObjectID><CustomerKey>orphans</CustomerKey>\
                 <Name>Orphans</Name></Results>",
            ),
        ));
        // Field retrieve errors out terminally.
        soap.always(MockResponse::text(500, "boom"));

        let ctx = fixture.context();
        let result = run_extractor(&DataExtensionExtractor, &ctx).await;
        assert_eq!(result.status, ExtractorStatus::Partial);
        assert_eq!(result.items.len(), 1);
        assert!(!result.errors.is_empty());
    }
}
