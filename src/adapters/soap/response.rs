//! DIAN SOAP response parsing.
//!
//! Responses are scanned by local element name; DIAN's WCF stack varies its
//! namespace prefixes between environments, so prefix-sensitive matching
//! would be brittle.

use crate::adapters::soap::{AsyncResponse, StatusZipResponse};
use crate::infra::error::{EngineError, EngineResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

/// A SOAP fault surfaced by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: Option<String>,
    pub reason: String,
}

/// Collect the concatenated text of every element, keyed by local name.
/// Repeated names (e.g. error `string` items) accumulate into a list.
fn text_by_local_name(xml: &str) -> EngineResult<HashMap<String, Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| EngineError::Upstream(format!("unparseable SOAP response: {e}")))?
        {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                out.entry(name.clone()).or_default().push(String::new());
                stack.push(name);
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                if let Some(current) = stack.last() {
                    let text = t
                        .unescape()
                        .map_err(|e| EngineError::Upstream(format!("bad SOAP text: {e}")))?;
                    if let Some(slot) = out.get_mut(current).and_then(|v| v.last_mut()) {
                        slot.push_str(&text);
                    }
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                out.entry(name).or_default().push(String::new());
            }
            _ => {}
        }
    }
    Ok(out)
}

fn first(map: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    map.get(name)
        .and_then(|v| v.first())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Detect a SOAP 1.2 (or 1.1) fault in a response body.
#[must_use]
pub fn parse_fault(xml: &str) -> Option<SoapFault> {
    let map = text_by_local_name(xml).ok()?;
    map.contains_key("Fault").then(|| SoapFault {
        code: first(&map, "Value").or_else(|| first(&map, "faultcode")),
        reason: first(&map, "Text")
            .or_else(|| first(&map, "Reason"))
            .or_else(|| first(&map, "faultstring"))
            .unwrap_or_else(|| "SOAP fault without reason".to_string()),
    })
}

/// Parse the `SendBillAsync` response into an [`AsyncResponse`].
pub fn parse_send_bill(xml: &str) -> EngineResult<AsyncResponse> {
    if let Some(fault) = parse_fault(xml) {
        return Ok(AsyncResponse {
            success: false,
            track_id: None,
            error_code: fault.code,
            error_message: Some(fault.reason),
        });
    }
    let map = text_by_local_name(xml)?;
    let track_id = first(&map, "ZipKey").or_else(|| first(&map, "TrackId"));
    let errors: Vec<String> = map
        .get("ErrorMessageList")
        .into_iter()
        .flat_map(|_| map.get("string").cloned().unwrap_or_default())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    match track_id {
        Some(track_id) => Ok(AsyncResponse {
            success: true,
            track_id: Some(track_id),
            error_code: None,
            error_message: None,
        }),
        None => Ok(AsyncResponse {
            success: false,
            track_id: None,
            error_code: errors.first().map(|e| e.split(' ').next().unwrap_or("").to_string()),
            error_message: if errors.is_empty() {
                Some("SendBillAsync response carried no track id".to_string())
            } else {
                Some(errors.join("; "))
            },
        }),
    }
}

/// Parse the `GetStatusZip` response.
pub fn parse_get_status(xml: &str, requested_track_id: &str) -> EngineResult<StatusZipResponse> {
    if let Some(fault) = parse_fault(xml) {
        return Err(EngineError::Upstream(format!(
            "GetStatusZip fault: {}",
            fault.reason
        )));
    }
    let map = text_by_local_name(xml)?;
    let status_code = first(&map, "StatusCode").ok_or_else(|| {
        EngineError::Upstream("GetStatusZip response carried no StatusCode".to_string())
    })?;
    Ok(StatusZipResponse {
        track_id: first(&map, "TrackId").unwrap_or_else(|| requested_track_id.to_string()),
        status_code,
        status_message: first(&map, "StatusDescription").or_else(|| first(&map, "StatusMessage")),
        zip_base64: first(&map, "XmlBase64Bytes").unwrap_or_default(),
    })
}
