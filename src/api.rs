//! JSON-over-HTTP client for the training-centre backend, plus the service
//! traits the domain components consume (tests substitute recording mocks).
use crate::dispatcher::LabEvent;
use crate::model::{Batch, Booking, BookingRecord, NewBooking, Pc, Student, Teacher, TimeSlot};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to reach backend: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint is not provided by this backend (HTTP 404). Bulk
    /// workflows use this to decide when to fall back to per-item calls.
    #[error("endpoint not available on this backend")]
    Unavailable,
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint URL: {0}")]
    BadUrl(String),
}

/// Read access to the catalog slices.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn fetch_pcs_by_row(&self) -> Result<BTreeMap<u32, Vec<Pc>>, ApiError>;
    async fn fetch_students(&self) -> Result<Vec<Student>, ApiError>;
    async fn fetch_teachers(&self) -> Result<Vec<Teacher>, ApiError>;
    async fn fetch_batches(&self) -> Result<Vec<Batch>, ApiError>;
}

/// Booking reads, mutations and the two server-side bulk endpoints.
#[async_trait]
pub trait BookingService: Send + Sync {
    async fn list_bookings(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Vec<BookingRecord>, ApiError>;

    async fn create_booking(&self, payload: &NewBooking) -> Result<BookingRecord, ApiError>;

    async fn delete_booking(&self, id: &str) -> Result<(), ApiError>;

    async fn apply_previous(
        &self,
        target_date: NaiveDate,
        source: &[Booking],
    ) -> Result<ApplyPreviousResponse, ApiError>;

    async fn clear_bulk(
        &self,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<ClearBulkResponse, ApiError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPreviousResponse {
    pub applied_count: usize,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBulkResponse {
    pub deleted_count: usize,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingResponse {
    booking: BookingRecord,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBookingResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct LabApiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for LabApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LabApiClient {
    pub fn new(base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("lab-board/0.1")
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::BadUrl(format!("{path}: {e}")))
    }

    /// Reads the newline-delimited notification stream, forwarding each
    /// well-formed event. Returns when the connection closes or every
    /// receiver is gone; the caller decides whether to reconnect.
    pub async fn stream_events(
        &self,
        tx: &tokio::sync::mpsc::UnboundedSender<LabEvent>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("lab/events")?;
        debug!(%url, "subscribing to notification stream");
        let mut res = Self::ensure_success(self.http.get(url).send().await?).await?;
        // buffer bytes, not text: a UTF-8 sequence can straddle two chunks
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = res.chunk().await? {
            buf.extend_from_slice(&chunk);
            while let Some(line) = take_line(&mut buf) {
                if let Some(event) = parse_event_line(&line) {
                    if tx.send(event).is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Non-2xx handling shared by every call: the response body is carried
    /// verbatim so backend business messages reach the user unchanged.
    async fn ensure_success(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = res.text().await.unwrap_or_default();
        Err(ApiError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CatalogService for LabApiClient {
    async fn fetch_pcs_by_row(&self) -> Result<BTreeMap<u32, Vec<Pc>>, ApiError> {
        let url = self.endpoint("lab/pcs-by-row")?;
        debug!(%url, "fetching PCs by row");
        let res = Self::ensure_success(self.http.get(url).send().await?).await?;
        let wire: BTreeMap<String, Vec<Pc>> = res.json().await?;
        Ok(rows_from_wire(wire))
    }

    async fn fetch_students(&self) -> Result<Vec<Student>, ApiError> {
        let url = self.endpoint("students")?;
        let res = Self::ensure_success(self.http.get(url).send().await?).await?;
        let value: Value = res.json().await?;
        extract_students(value)
    }

    async fn fetch_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
        let url = self.endpoint("teachers")?;
        let res = Self::ensure_success(self.http.get(url).send().await?).await?;
        Ok(res.json().await?)
    }

    async fn fetch_batches(&self) -> Result<Vec<Batch>, ApiError> {
        let url = self.endpoint("batches")?;
        let res = Self::ensure_success(self.http.get(url).send().await?).await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl BookingService for LabApiClient {
    async fn list_bookings(
        &self,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Vec<BookingRecord>, ApiError> {
        let url = self.endpoint("lab/bookings")?;
        let res = self
            .http
            .get(url)
            .query(&[
                ("date", date.to_string()),
                ("timeSlot", slot.wire_label().to_string()),
            ])
            .send()
            .await?;
        let res = Self::ensure_success(res).await?;
        Ok(res.json().await?)
    }

    async fn create_booking(&self, payload: &NewBooking) -> Result<BookingRecord, ApiError> {
        let url = self.endpoint("lab/bookings")?;
        debug!(pc = %payload.pc, slot = %payload.time_slot, "creating booking");
        let res = self.http.post(url).json(payload).send().await?;
        let res = Self::ensure_success(res).await?;
        let body: CreateBookingResponse = res.json().await?;
        if let Some(message) = body.message {
            debug!(%message, "booking created");
        }
        Ok(body.booking)
    }

    async fn delete_booking(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("lab/bookings/{id}"))?;
        let res = self.http.delete(url).send().await?;
        let res = Self::ensure_success(res).await?;
        let body: DeleteBookingResponse = res.json().await.unwrap_or(DeleteBookingResponse {
            message: None,
        });
        if let Some(message) = body.message {
            debug!(%message, "booking deleted");
        }
        Ok(())
    }

    async fn apply_previous(
        &self,
        target_date: NaiveDate,
        source: &[Booking],
    ) -> Result<ApplyPreviousResponse, ApiError> {
        let url = self.endpoint("lab/bookings/apply-previous")?;
        let body = json!({
            "targetDate": target_date,
            "bookings": source,
        });
        let res = self.http.post(url).json(&body).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::Unavailable);
        }
        let res = Self::ensure_success(res).await?;
        Ok(res.json().await?)
    }

    async fn clear_bulk(
        &self,
        date: NaiveDate,
        slots: &[TimeSlot],
    ) -> Result<ClearBulkResponse, ApiError> {
        let url = self.endpoint("lab/bookings/clear-bulk")?;
        let body = json!({
            "date": date,
            "timeSlots": slots,
        });
        let res = self.http.delete(url).json(&body).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::Unavailable);
        }
        let res = Self::ensure_success(res).await?;
        Ok(res.json().await?)
    }
}

/// Row keys arrive as JSON object keys (strings). Non-numeric keys are
/// dropped with a warning rather than failing the whole fetch.
fn rows_from_wire(wire: BTreeMap<String, Vec<Pc>>) -> BTreeMap<u32, Vec<Pc>> {
    let mut rows = BTreeMap::new();
    for (key, mut pcs) in wire {
        match key.parse::<u32>() {
            Ok(row) => {
                pcs.sort_by_key(|pc| pc.pc_number);
                rows.insert(row, pcs);
            }
            Err(_) => warn!(key, "dropping PC row with non-numeric key"),
        }
    }
    rows
}

/// Drains one complete line from the stream buffer, or nothing if no
/// newline has arrived yet.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// One line of the notification stream. Blank lines are keep-alives;
/// malformed lines are dropped with a warning.
fn parse_event_line(line: &str) -> Option<LabEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<LabEvent>(line) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(%err, "ignoring malformed event line");
            None
        }
    }
}

/// The student endpoint has shipped three payload shapes over time: a bare
/// array, `{"data": [...]}` and `{"data": {"students": [...]}}`.
pub fn extract_students(value: Value) -> Result<Vec<Student>, ApiError> {
    let list = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => Value::Array(items),
            Some(Value::Object(mut inner)) => match inner.remove("students") {
                Some(Value::Array(items)) => Value::Array(items),
                _ => Value::Array(Vec::new()),
            },
            _ => Value::Array(Vec::new()),
        },
        _ => Value::Array(Vec::new()),
    };
    Ok(serde_json::from_value(list)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PcStatus;
    use serde_json::json;

    #[test]
    fn extract_students_handles_all_shapes() {
        let bare = json!([{"id": "s1", "name": "Asha"}]);
        assert_eq!(extract_students(bare).unwrap().len(), 1);

        let wrapped = json!({"data": [{"id": "s1", "name": "Asha"}, {"id": "s2", "name": "Ravi"}]});
        assert_eq!(extract_students(wrapped).unwrap().len(), 2);

        let nested = json!({"data": {"students": [{"id": "s3", "name": "Mira"}]}});
        let students = extract_students(nested).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "s3");

        assert!(extract_students(json!({"data": null})).unwrap().is_empty());
        assert!(extract_students(json!("nonsense")).unwrap().is_empty());
    }

    #[test]
    fn rows_from_wire_parses_keys_and_sorts_pcs() {
        let pc = |id: &str, n: u32| Pc {
            id: id.into(),
            pc_number: n,
            row_number: 1,
            status: PcStatus::Active,
        };
        let mut wire = BTreeMap::new();
        wire.insert("1".to_string(), vec![pc("b", 2), pc("a", 1)]);
        wire.insert("junk".to_string(), vec![pc("c", 3)]);

        let rows = rows_from_wire(wire);
        assert_eq!(rows.len(), 1);
        let row1 = &rows[&1];
        assert_eq!(row1[0].pc_number, 1);
        assert_eq!(row1[1].pc_number, 2);
    }

    #[test]
    fn endpoint_joins_against_base() {
        let client = LabApiClient::new(Url::parse("http://localhost:5000/api/").unwrap());
        let url = client.endpoint("lab/bookings").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/lab/bookings");
    }

    #[test]
    fn parse_event_line_skips_keepalives_and_junk() {
        assert!(parse_event_line("\n").is_none());
        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line("not json\n").is_none());
        let event = parse_event_line("{\"topic\":\"pc_status\"}\n").unwrap();
        assert_eq!(event.topic, "pc_status");
    }

    #[test]
    fn event_line_survives_chunk_split_inside_utf8() {
        let line = "{\"topic\":\"booking\",\"payload\":\"café\"}\n";
        let bytes = line.as_bytes();
        // split between the two bytes of the 'é' sequence
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buf = Vec::new();
        buf.extend_from_slice(&bytes[..split]);
        assert!(take_line(&mut buf).is_none());

        buf.extend_from_slice(&bytes[split..]);
        let got = take_line(&mut buf).unwrap();
        let event = parse_event_line(&got).unwrap();
        assert_eq!(event.topic, "booking");
        assert_eq!(event.payload, json!("café"));
        assert!(buf.is_empty());
    }

    #[test]
    fn apply_previous_response_tolerates_missing_fields() {
        let res: ApplyPreviousResponse =
            serde_json::from_value(json!({"appliedCount": 4})).unwrap();
        assert_eq!(res.applied_count, 4);
        assert!(res.errors.is_empty());
        assert!(res.message.is_none());
    }
}
