//! CSV export of the queue register for the admin dashboard. The column
//! set is fixed; rows follow whatever filters the dashboard applied.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Queue, QueueError, QueueFilters};
use crate::services::queue::QueueService;

/// UTF-8 byte order mark so spreadsheet apps decode the export correctly.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

const CSV_HEADERS: [&str; 11] = [
    "Ticket",
    "Medical Record No.",
    "Patient Name",
    "Phone",
    "Service",
    "Status",
    "Doctor",
    "Counter",
    "Created At",
    "Called At",
    "Finished At",
];

impl QueueService {
    pub async fn export_csv(
        &self,
        filters: &QueueFilters,
        auth_token: &str,
    ) -> Result<Vec<u8>, QueueError> {
        let queues = self.list_queues(filters, auth_token).await?;
        debug!("Exporting {} queue row(s) to CSV", queues.len());

        let patients = self
            .name_map(
                "patients",
                "id,name,medical_record_number,phone",
                queues.iter().filter_map(|q| q.patient_id),
                auth_token,
            )
            .await?;
        let services = self
            .name_map(
                "services",
                "id,name",
                queues.iter().map(|q| q.service_id),
                auth_token,
            )
            .await?;
        let schedules = self
            .name_map(
                "doctor_schedules",
                "id,doctor_name",
                queues.iter().filter_map(|q| q.doctor_schedule_id),
                auth_token,
            )
            .await?;
        let counters = self
            .name_map(
                "counters",
                "id,name",
                queues.iter().filter_map(|q| q.counter_id),
                auth_token,
            )
            .await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(CSV_HEADERS)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        for queue in &queues {
            let patient = queue.patient_id.and_then(|id| patients.get(&id));
            let record = [
                queue.number.clone(),
                field(patient, "medical_record_number"),
                field(patient, "name"),
                field(patient, "phone"),
                field(services.get(&queue.service_id), "name"),
                queue.status.as_str().to_string(),
                field(
                    queue.doctor_schedule_id.and_then(|id| schedules.get(&id)),
                    "doctor_name",
                ),
                field(queue.counter_id.and_then(|id| counters.get(&id)), "name"),
                timestamp(Some(queue.created_at)),
                timestamp(queue.called_at),
                timestamp(queue.finished_at),
            ];
            writer
                .write_record(&record)
                .map_err(|e| QueueError::Database(e.to_string()))?;
        }

        let body = writer
            .into_inner()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut output = Vec::with_capacity(UTF8_BOM.len() + body.len());
        output.extend_from_slice(UTF8_BOM);
        output.extend_from_slice(&body);
        Ok(output)
    }

    /// One `id=in.(...)` lookup per referenced table instead of a fetch
    /// per row.
    async fn name_map(
        &self,
        table: &str,
        select: &str,
        ids: impl Iterator<Item = Uuid>,
        auth_token: &str,
    ) -> Result<HashMap<Uuid, Value>, QueueError> {
        let mut unique: Vec<Uuid> = ids.collect();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let id_list = unique
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/{}?id=in.({})&select={}", table, id_list, select),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut map = HashMap::new();
        for row in rows {
            if let Some(id) = row["id"].as_str().and_then(|s| s.parse::<Uuid>().ok()) {
                map.insert(id, row);
            }
        }
        Ok(map)
    }
}

fn field(row: Option<&Value>, key: &str) -> String {
    row.and_then(|r| r[key].as_str())
        .unwrap_or_default()
        .to_string()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
