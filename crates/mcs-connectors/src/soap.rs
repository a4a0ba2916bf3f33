//! SOAP client for the platform's XML surface.
//!
//! Envelopes carry the OAuth token in a `fueloauth` header element.
//! Retrieval pagination follows the platform protocol: an initial
//! `RetrieveRequest`, then `ContinueRequest` messages keyed by the returned
//! `RequestID` for as long as `OverallStatus` is `MoreDataAvailable`.
//!
//! Responses are parsed generically into `serde_json::Value`: element names
//! become keys, repeated siblings become arrays, attributes land under
//! `@name` keys, and namespaces are stripped.

use crate::auth::TokenManager;
use crate::error::{TransportError, TransportResult};
use crate::http::{HttpBackend, HttpRequest, RequestBody};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hard ceiling on continuation pages per retrieve.
pub const MAX_SOAP_PAGES: u32 = 100;

const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Equality-style filter on a single property.
#[derive(Debug, Clone)]
pub struct SimpleFilter {
    pub property: String,
    pub operator: String,
    pub value: String,
}

impl SimpleFilter {
    pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            operator: "equals".to_string(),
            value: value.into(),
        }
    }
}

/// One parsed Retrieve response.
#[derive(Debug, Default)]
pub struct RetrieveResponse {
    pub ok: bool,
    pub overall_status: Option<String>,
    pub request_id: Option<String>,
    pub objects: Vec<Value>,
    pub error: Option<String>,
}

/// Accumulated result of a full paginated retrieve.
#[derive(Debug, Default)]
pub struct RetrieveOutcome {
    pub objects: Vec<Value>,
    pub pages: u32,
    pub error: Option<TransportError>,
}

/// XML envelope client for Retrieve/Continue operations.
pub struct SoapClient {
    backend: Arc<dyn HttpBackend>,
    tokens: Arc<TokenManager>,
    endpoint: String,
    max_retries: u32,
    cancel: CancellationToken,
}

impl SoapClient {
    pub fn new(
        endpoint: impl Into<String>,
        backend: Arc<dyn HttpBackend>,
        tokens: Arc<TokenManager>,
        max_retries: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            tokens,
            endpoint: endpoint.into(),
            max_retries: max_retries.max(1),
            cancel,
        }
    }

    /// Executes one Retrieve request.
    pub async fn retrieve(
        &self,
        object_type: &str,
        properties: &[&str],
        filter: Option<&SimpleFilter>,
    ) -> TransportResult<RetrieveResponse> {
        self.post_with_retry(|token| build_retrieve_envelope(token, object_type, properties, filter))
            .await
    }

    /// Continues a prior Retrieve by request id.
    pub async fn retrieve_continue(&self, request_id: &str) -> TransportResult<RetrieveResponse> {
        self.post_with_retry(|token| build_continue_envelope(token, request_id))
            .await
    }

    /// Retrieves all pages for an object type, up to [`MAX_SOAP_PAGES`].
    ///
    /// A failure after the first page keeps the objects already collected.
    pub async fn retrieve_all(
        &self,
        object_type: &str,
        properties: &[&str],
        filter: Option<&SimpleFilter>,
    ) -> RetrieveOutcome {
        let mut outcome = RetrieveOutcome::default();

        let mut response = match self.retrieve(object_type, properties, filter).await {
            Ok(response) => response,
            Err(e) => {
                outcome.error = Some(e);
                return outcome;
            }
        };

        loop {
            outcome.pages += 1;
            if !response.ok {
                outcome.error = Some(TransportError::InvalidResponse(
                    response
                        .error
                        .or(response.overall_status)
                        .unwrap_or_else(|| "retrieve failed".to_string()),
                ));
                break;
            }
            outcome.objects.append(&mut response.objects);

            let more = response.overall_status.as_deref() == Some("MoreDataAvailable");
            if !more || outcome.pages >= MAX_SOAP_PAGES {
                break;
            }
            let Some(request_id) = response.request_id.clone() else {
                warn!(object_type, "MoreDataAvailable without RequestID");
                break;
            };

            response = match self.retrieve_continue(&request_id).await {
                Ok(response) => response,
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            };
        }

        outcome
    }

    /// Posts an envelope with the shared retry policy. The envelope is
    /// rebuilt each attempt so a token refresh after 401 takes effect.
    async fn post_with_retry<F>(&self, build: F) -> TransportResult<RetrieveResponse>
    where
        F: Fn(&str) -> String,
    {
        let mut attempt: u32 = 0;
        let mut refreshed_after_401 = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Canceled);
            }
            let token = self.tokens.get_token().await?;
            let envelope = build(token.expose());
            let request = HttpRequest::post(self.endpoint.clone(), RequestBody::Xml(envelope))
                .with_header("SOAPAction", "Retrieve");

            attempt += 1;
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => Err(TransportError::Canceled),
                result = self.backend.execute(request) => result,
            };

            match sent {
                Ok(response) if response.status == 401 => {
                    if refreshed_after_401 {
                        return Err(TransportError::AuthFailed(
                            "SOAP request rejected again after token refresh".to_string(),
                        ));
                    }
                    refreshed_after_401 = true;
                    attempt -= 1;
                    self.tokens.force_refresh("soap 401").await?;
                }
                Ok(response) if RETRYABLE_STATUS.contains(&response.status) => {
                    if attempt >= self.max_retries {
                        return Err(TransportError::RetriesExhausted(format!(
                            "SOAP endpoint kept returning {}",
                            response.status
                        )));
                    }
                    let wait = RETRY_BASE * 2u32.pow(attempt.saturating_sub(1).min(10));
                    debug!(status = response.status, ?wait, "retrying SOAP request");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(TransportError::Canceled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Ok(response) => return Ok(parse_retrieve_response(&response.body)),
                Err(TransportError::Canceled) => return Err(TransportError::Canceled),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.max_retries {
                        return Err(TransportError::RetriesExhausted(e.to_string()));
                    }
                    let wait = RETRY_BASE * 2u32.pow(attempt.saturating_sub(1).min(10));
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(TransportError::Canceled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds a Retrieve envelope with the token in the `fueloauth` header.
pub fn build_retrieve_envelope(
    token: &str,
    object_type: &str,
    properties: &[&str],
    filter: Option<&SimpleFilter>,
) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<RetrieveRequestMsg><RetrieveRequest><ObjectType>{}</ObjectType>",
        escape(object_type)
    );
    for property in properties {
        let _ = write!(body, "<Properties>{}</Properties>", escape(property));
    }
    if let Some(filter) = filter {
        let _ = write!(
            body,
            "<Filter xsi:type=\"SimpleFilterPart\"><Property>{}</Property>\
             <SimpleOperator>{}</SimpleOperator><Value>{}</Value></Filter>",
            escape(&filter.property),
            escape(&filter.operator),
            escape(&filter.value)
        );
    }
    body.push_str("</RetrieveRequest></RetrieveRequestMsg>");
    wrap_envelope(token, &body)
}

/// Builds a ContinueRequest envelope for pagination.
pub fn build_continue_envelope(token: &str, request_id: &str) -> String {
    let body = format!(
        "<RetrieveRequestMsg><RetrieveRequest><ContinueRequest>{}</ContinueRequest>\
         </RetrieveRequest></RetrieveRequestMsg>",
        escape(request_id)
    );
    wrap_envelope(token, &body)
}

fn wrap_envelope(token: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns=\"http://exacttarget.com/wsdl/partnerAPI\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <s:Header><fueloauth>{}</fueloauth></s:Header>\
         <s:Body>{}</s:Body></s:Envelope>",
        escape(token),
        body
    )
}

/// Parses a Retrieve response body.
pub fn parse_retrieve_response(xml: &str) -> RetrieveResponse {
    let mut parsed = RetrieveResponse::default();

    let document = match xml_to_value(xml) {
        Ok(document) => document,
        Err(e) => {
            parsed.error = Some(e.to_string());
            return parsed;
        }
    };

    let body = match document.get("Body") {
        Some(body) => body,
        None => {
            parsed.error = Some("no SOAP Body in response".to_string());
            return parsed;
        }
    };

    if let Some(fault) = body.get("Fault") {
        parsed.error = Some(
            fault
                .get("faultstring")
                .and_then(|v| v.as_str())
                .unwrap_or("SOAP fault")
                .to_string(),
        );
        return parsed;
    }

    let Some(message) = body.get("RetrieveResponseMsg") else {
        parsed.error = Some("no RetrieveResponseMsg in response".to_string());
        return parsed;
    };

    parsed.overall_status = message
        .get("OverallStatus")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    parsed.request_id = message
        .get("RequestID")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    parsed.ok = matches!(
        parsed.overall_status.as_deref(),
        Some("OK") | Some("MoreDataAvailable")
    );
    if !parsed.ok {
        parsed.error = parsed.overall_status.clone();
    }

    match message.get("Results") {
        Some(Value::Array(results)) => parsed.objects = results.clone(),
        Some(single) if !single.is_null() => parsed.objects = vec![single.clone()],
        _ => {}
    }

    parsed
}

/// Generic XML→JSON conversion with namespace stripping.
pub fn xml_to_value(xml: &str) -> TransportResult<Value> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader
            .read_event()
            .map_err(|e| TransportError::InvalidResponse(format!("XML parse error: {}", e)))?
        {
            Event::Start(start) => return read_element(&mut reader, &start),
            Event::Empty(start) => return Ok(attrs_only_value(&start)),
            Event::Eof => {
                return Err(TransportError::InvalidResponse(
                    "empty XML document".to_string(),
                ))
            }
            _ => {}
        }
    }
}

fn read_element<'a>(
    reader: &mut Reader<&'a [u8]>,
    start: &BytesStart<'a>,
) -> TransportResult<Value> {
    let mut map = attr_map(start);
    let mut text = String::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| TransportError::InvalidResponse(format!("XML parse error: {}", e)))?
        {
            Event::Start(child) => {
                let name = local_name(&child);
                let value = read_element(reader, &child)?;
                insert_repeated(&mut map, name, value);
            }
            Event::Empty(child) => {
                let name = local_name(&child);
                insert_repeated(&mut map, name, attrs_only_value(&child));
            }
            Event::Text(t) => {
                text.push_str(
                    &t.unescape()
                        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?,
                );
            }
            Event::CData(t) => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(TransportError::InvalidResponse(
                    "unexpected end of XML document".to_string(),
                ))
            }
            _ => {}
        }
    }

    if map.is_empty() {
        Ok(if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        })
    } else {
        if !text.trim().is_empty() {
            map.insert("#text".to_string(), Value::String(text));
        }
        Ok(Value::Object(map))
    }
}

fn attr_map(start: &BytesStart<'_>) -> Map<String, Value> {
    let mut map = Map::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        map.insert(format!("@{}", key), Value::String(value));
    }
    map
}

fn attrs_only_value(start: &BytesStart<'_>) -> Value {
    let map = attr_map(start);
    if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().local_name().as_ref()).to_string()
}

fn insert_repeated(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(existing)) => existing.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::testing::{MockBackend, MockResponse};
    use serde_json::json;

    const NS: &str = "xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" \
                      xmlns=\"http://exacttarget.com/wsdl/partnerAPI\"";

    fn retrieve_body(status: &str, request_id: &str, results: &str) -> String {
        format!(
            "<soap:Envelope {NS}><soap:Body><RetrieveResponseMsg>\
             <OverallStatus>{status}</OverallStatus>\
             <RequestID>{request_id}</RequestID>{results}\
             </RetrieveResponseMsg></soap:Body></soap:Envelope>"
        )
    }

    fn soap_client(backend: Arc<MockBackend>) -> SoapClient {
        let config = ConnectionConfig {
            rest_base: "https://x.rest.example.com".into(),
            soap_base: "https://x.soap.example.com/Service.asmx".into(),
            auth_base: "https://x.auth.example.com".into(),
            client_id: "cid".into(),
            client_secret: "cs".into(),
            account_id: None,
            timeout_secs: 60,
            max_retries: 3,
            verify_tls: true,
        };
        backend.on("/v2/token").always(MockResponse::json(
            200,
            json!({"access_token": "tok", "expires_in": 3600}),
        ));
        let tokens = Arc::new(TokenManager::new(
            config,
            backend.clone() as Arc<dyn crate::http::HttpBackend>,
        ));
        SoapClient::new(
            "https://x.soap.example.com/Service.asmx",
            backend,
            tokens,
            3,
            CancellationToken::new(),
        )
    }

    #[test]
    fn envelope_carries_token_and_properties() {
        let filter = SimpleFilter::equals("ContentType", "dataextension");
        let envelope =
            build_retrieve_envelope("my-token", "DataFolder", &["ID", "Name"], Some(&filter));
        assert!(envelope.contains("<fueloauth>my-token</fueloauth>"));
        assert!(envelope.contains("<ObjectType>DataFolder</ObjectType>"));
        assert!(envelope.contains("<Properties>ID</Properties>"));
        assert!(envelope.contains("<Properties>Name</Properties>"));
        assert!(envelope.contains("SimpleFilterPart"));
        assert!(envelope.contains("<Value>dataextension</Value>"));
    }

    #[test]
    fn envelope_escapes_special_characters() {
        let envelope = build_retrieve_envelope("t<&t", "Email", &[], None);
        assert!(envelope.contains("t&lt;&amp;t"));
    }

    #[test]
    fn continue_envelope_carries_request_id() {
        let envelope = build_continue_envelope("tok", "req-42");
        assert!(envelope.contains("<ContinueRequest>req-42</ContinueRequest>"));
    }

    #[test]
    fn xml_to_value_strips_namespaces_and_collects_repeats() {
        let value = xml_to_value(
            "<ns:Root xmlns:ns=\"urn:x\">\
             <ns:Item id=\"1\"><ns:Name>a</ns:Name></ns:Item>\
             <ns:Item id=\"2\"><ns:Name>b</ns:Name></ns:Item>\
             </ns:Root>",
        )
        .unwrap();
        let items = value.get("Item").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["@id"], "1");
        assert_eq!(items[1]["Name"], "b");
    }

    #[test]
    fn parse_retrieve_extracts_status_objects_and_nested_refs() {
        let xml = retrieve_body(
            "OK",
            "req-1",
            "<Results><ID>10</ID><Name>Campaigns</Name>\
             <ParentFolder><ID>1</ID><Name>Root</Name></ParentFolder></Results>\
             <Results><ID>11</ID><Name>Archive</Name></Results>",
        );
        let parsed = parse_retrieve_response(&xml);
        assert!(parsed.ok);
        assert_eq!(parsed.overall_status.as_deref(), Some("OK"));
        assert_eq!(parsed.objects.len(), 2);
        assert_eq!(parsed.objects[0]["ParentFolder"]["ID"], "1");
    }

    #[test]
    fn parse_retrieve_single_result_normalizes_to_list() {
        let xml = retrieve_body("OK", "req-1", "<Results><ID>10</ID></Results>");
        let parsed = parse_retrieve_response(&xml);
        assert_eq!(parsed.objects.len(), 1);
    }

    #[test]
    fn parse_retrieve_surfaces_faults() {
        let xml = format!(
            "<soap:Envelope {NS}><soap:Body><soap:Fault>\
             <faultstring>Token Expired</faultstring>\
             </soap:Fault></soap:Body></soap:Envelope>"
        );
        let parsed = parse_retrieve_response(&xml);
        assert!(!parsed.ok);
        assert_eq!(parsed.error.as_deref(), Some("Token Expired"));
    }

    #[test]
    fn parse_retrieve_reports_malformed_xml() {
        let parsed = parse_retrieve_response("<unclosed>");
        assert!(!parsed.ok);
        assert!(parsed.error.is_some());
    }

    #[tokio::test]
    async fn retrieve_all_follows_continue_requests() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/Service.asmx");
        route.push(MockResponse::text(
            200,
            retrieve_body(
                "MoreDataAvailable",
                "req-7",
                "<Results><ID>1</ID></Results>",
            ),
        ));
        route.push(MockResponse::text(
            200,
            retrieve_body("OK", "req-7", "<Results><ID>2</ID></Results>"),
        ));

        let client = soap_client(backend.clone());
        let outcome = client
            .retrieve_all("TriggeredSendDefinition", &["ObjectID"], None)
            .await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.objects.len(), 2);
        assert_eq!(outcome.pages, 2);

        let soap_requests = backend.requests_to("/Service.asmx");
        assert_eq!(soap_requests.len(), 2);
        match &soap_requests[1].body {
            Some(RequestBody::Xml(xml)) => {
                assert!(xml.contains("<ContinueRequest>req-7</ContinueRequest>"))
            }
            other => panic!("expected XML body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn retrieve_all_keeps_objects_on_mid_pagination_failure() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/Service.asmx");
        route.push(MockResponse::text(
            200,
            retrieve_body(
                "MoreDataAvailable",
                "req-9",
                "<Results><ID>1</ID></Results>",
            ),
        ));
        route.push(MockResponse::text(
            200,
            retrieve_body("Error", "req-9", ""),
        ));

        let client = soap_client(backend);
        let outcome = client.retrieve_all("Email", &["ID"], None).await;
        assert_eq!(outcome.objects.len(), 1);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn soap_401_triggers_refresh_and_envelope_rebuild() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/Service.asmx");
        route.push(MockResponse::text(401, ""));
        route.push(MockResponse::text(
            200,
            retrieve_body("OK", "req-1", "<Results><ID>1</ID></Results>"),
        ));

        let client = soap_client(backend.clone());
        let parsed = client.retrieve("List", &["ID"], None).await.unwrap();
        assert!(parsed.ok);
        assert_eq!(backend.requests_to("/v2/token").len(), 2);
    }
}
